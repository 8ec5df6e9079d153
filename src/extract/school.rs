//! School detail page extractor
//!
//! Reads the catalog's school detail markup: name and classification tag,
//! contact block, IDEB/IDESP scores, the student age table, class counts and
//! the classroom count from the infrastructure boxes. A `-` placeholder in any
//! cell is treated as "no data".

use crate::extract::{ExtractError, Extractor};
use crate::record::{RawFields, CLASSIFICATION_FIELD, NAME_FIELD};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Age band label as shown in the student table, and the two fields it fills
const AGE_BANDS: [(&str, &str, &str); 4] = [
    ("06 a 10 anos", "age_06_10_final_years", "age_06_10_high_school"),
    ("11 a 14 anos", "age_11_14_final_years", "age_11_14_high_school"),
    ("15 a 17 anos", "age_15_17_final_years", "age_15_17_high_school"),
    ("acima dos 18 anos", "age_18_plus_final_years", "age_18_plus_high_school"),
];

const SCORE_FIELDS: [&str; 4] = [
    "ideb_score_final_years",
    "idesp_score_final_years",
    "ideb_score_high_school",
    "idesp_score_high_school",
];

const PHONE_PATTERN: &str = r"\(\d{2}\)\s*\d{4,5}-?\d{4}";
const EMAIL_PATTERN: &str = r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}";

struct Selectors {
    content: Selector,
    name: Selector,
    tag: Selector,
    info_block: Selector,
    info_header: Selector,
    heading: Selector,
    quantity: Selector,
    table: Selector,
    thead_row: Selector,
    tbody_row: Selector,
    th: Selector,
    td: Selector,
    contact_block: Selector,
    paragraph: Selector,
    score_list: Selector,
    any_list: Selector,
    list_item: Selector,
    score_title: Selector,
    ideb: Selector,
    idesp: Selector,
    infra_box: Selector,
    infra_title: Selector,
    infra_number: Selector,
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector(format!("{}: {:?}", css, e)))
}

impl Selectors {
    fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            content: selector("div.conteudo")?,
            name: selector("h2#nome-escola")?,
            tag: selector("div.tag p.tags")?,
            info_block: selector("div.info-alunos")?,
            info_header: selector("div.alunos")?,
            heading: selector("h2")?,
            quantity: selector("span#quantidade-alunos")?,
            table: selector("table")?,
            thead_row: selector("thead tr")?,
            tbody_row: selector("tbody tr")?,
            th: selector("th")?,
            td: selector("td")?,
            contact_block: selector("div.escola-dados")?,
            paragraph: selector("p")?,
            score_list: selector("div.classificacao ul")?,
            any_list: selector("ul")?,
            list_item: selector("li")?,
            score_title: selector("h2.titulo-classificacao")?,
            ideb: selector("p#ideb-nota")?,
            idesp: selector("p#idesp-nota")?,
            infra_box: selector("div.infraestrutura-escola div.infraestrutura div.box")?,
            infra_title: selector("b#tituloInfraestrutura")?,
            infra_number: selector("div.inf ul li span#numeroInfraestrutura")?,
        })
    }
}

/// Extractor for the school detail page
pub struct SchoolDetailExtractor {
    s: Selectors,
    phone: Regex,
    email: Regex,
}

/// Column positions of the two school levels in a level table
#[derive(Debug, Default)]
struct LevelColumns {
    final_years: Option<usize>,
    high_school: Option<usize>,
}

impl LevelColumns {
    fn pick(&self, cells: &[String]) -> (String, String) {
        let get = |idx: Option<usize>| {
            idx.and_then(|i| cells.get(i))
                .map(|v| clean(v))
                .unwrap_or_default()
        };
        (get(self.final_years), get(self.high_school))
    }
}

/// Whitespace-normalized text content of an element
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean(value: &str) -> String {
    let value = value.trim();
    if value == "-" {
        String::new()
    } else {
        value.to_string()
    }
}

fn after_label(text: &str, label: &str) -> Option<String> {
    text.split_once(label).map(|(_, rest)| rest.trim().to_string())
}

impl SchoolDetailExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            s: Selectors::new()?,
            phone: Regex::new(PHONE_PATTERN)?,
            email: Regex::new(EMAIL_PATTERN)?,
        })
    }

    fn level_columns(&self, table: ElementRef<'_>) -> LevelColumns {
        let header_row = table
            .select(&self.s.thead_row)
            .next()
            .or_else(|| table.select(&self.s.tbody_row).next());

        let mut columns = LevelColumns::default();
        if let Some(row) = header_row {
            for (idx, cell) in row.select(&self.s.th).enumerate() {
                let label = text_of(cell).to_lowercase();
                if label.starts_with("anos finais") {
                    columns.final_years = Some(idx);
                }
                if label.starts_with("ensino médio") {
                    columns.high_school = Some(idx);
                }
            }
        }
        columns
    }

    /// Body rows that carry data cells
    fn data_rows(&self, table: ElementRef<'_>) -> Vec<Vec<String>> {
        table
            .select(&self.s.tbody_row)
            .map(|row| row.select(&self.s.td).map(text_of).collect::<Vec<_>>())
            .filter(|cells| !cells.is_empty())
            .collect()
    }

    fn students(&self, block: ElementRef<'_>, header: ElementRef<'_>, raw: &mut RawFields) {
        if let Some(total) = header.select(&self.s.quantity).next() {
            raw.set("total_students", clean(&text_of(total)));
        }

        let Some(table) = block.select(&self.s.table).next() else {
            return;
        };
        let columns = self.level_columns(table);

        for cells in self.data_rows(table) {
            let age_range = cells[0].as_str();
            let Some((_, final_field, high_field)) =
                AGE_BANDS.iter().find(|(label, _, _)| *label == age_range)
            else {
                continue;
            };
            let (final_years, high_school) = columns.pick(&cells);
            raw.set(final_field, final_years);
            raw.set(high_field, high_school);
        }
    }

    fn classes(&self, block: ElementRef<'_>, header: ElementRef<'_>, raw: &mut RawFields) {
        if let Some(total) = header.select(&self.s.quantity).next() {
            raw.set("total_classes", clean(&text_of(total)));
        }

        let Some(table) = block.select(&self.s.table).next() else {
            return;
        };
        let columns = self.level_columns(table);

        for cells in self.data_rows(table) {
            let (final_years, high_school) = columns.pick(&cells);
            raw.set("classes_final_years", final_years);
            raw.set("classes_high_school", high_school);
        }
    }

    /// Fills address and contact fields from labelled paragraphs; never overwrites
    fn contact(&self, scope: ElementRef<'_>, raw: &mut RawFields) {
        for p in scope.select(&self.s.paragraph) {
            let text = text_of(p);

            if let Some(value) = after_label(&text, "Diretoria de Ensino:") {
                raw.set_if_empty("teaching_directorate", clean(&value));
            } else if let Some(value) = after_label(&text, "Bairro:") {
                raw.set_if_empty("neighborhood", clean(&value));
            } else if let Some(value) = after_label(&text, "Município:") {
                raw.set_if_empty("municipality", clean(&value));
            } else if text.contains('(') && text.chars().any(|c| c.is_ascii_digit()) {
                if let Some(m) = self.phone.find(&text) {
                    raw.set_if_empty("phone", m.as_str());
                }
            } else if text.contains('@') {
                if let Some(m) = self.email.find(&text) {
                    raw.set_if_empty("email", m.as_str());
                }
            }
        }
    }

    fn scores(&self, list: ElementRef<'_>, raw: &mut RawFields) {
        for item in list.select(&self.s.list_item) {
            let Some(title) = item.select(&self.s.score_title).next().map(text_of) else {
                continue;
            };
            let (ideb_field, idesp_field) = match title.as_str() {
                "Anos finais" => (SCORE_FIELDS[0], SCORE_FIELDS[1]),
                "Ensino Médio" => (SCORE_FIELDS[2], SCORE_FIELDS[3]),
                _ => continue,
            };

            if let Some(score) = item.select(&self.s.ideb).next() {
                raw.set(ideb_field, clean(&text_of(score)));
            }
            if let Some(score) = item.select(&self.s.idesp).next() {
                raw.set(idesp_field, clean(&text_of(score)));
            }
        }
    }

    fn classrooms(&self, content: ElementRef<'_>, raw: &mut RawFields) {
        for infra in content.select(&self.s.infra_box) {
            let is_classrooms = infra
                .select(&self.s.infra_title)
                .next()
                .map(|t| text_of(t) == "Salas de Aula")
                .unwrap_or(false);
            if !is_classrooms {
                continue;
            }
            if let Some(number) = infra.select(&self.s.infra_number).next() {
                raw.set("total_classrooms", clean(&text_of(number)));
            }
        }
    }
}

impl Extractor for SchoolDetailExtractor {
    fn extract(&self, document: &str) -> Result<RawFields, ExtractError> {
        let html = Html::parse_document(document);
        let content = html
            .select(&self.s.content)
            .next()
            .ok_or_else(|| ExtractError::MissingSection("div.conteudo".to_string()))?;

        let name = content
            .select(&self.s.name)
            .next()
            .ok_or_else(|| ExtractError::MissingField(NAME_FIELD.to_string()))?;

        let mut raw = RawFields::new();
        raw.set(NAME_FIELD, text_of(name));

        if let Some(tag) = content.select(&self.s.tag).next() {
            raw.set(CLASSIFICATION_FIELD, text_of(tag));
        }

        for block in content.select(&self.s.info_block) {
            let Some(header) = block.select(&self.s.info_header).next() else {
                continue;
            };
            let title = header.select(&self.s.heading).next().map(text_of);
            match title.as_deref() {
                Some("Alunos") => self.students(block, header, &mut raw),
                Some("Total de Turmas") => self.classes(block, header, &mut raw),
                _ => {}
            }
        }

        if let Some(block) = content.select(&self.s.contact_block).next() {
            self.contact(block, &mut raw);
        }
        if ["teaching_directorate", "neighborhood", "municipality"]
            .iter()
            .any(|f| raw.get(f).is_empty())
        {
            self.contact(content, &mut raw);
        }

        if let Some(list) = content.select(&self.s.score_list).next() {
            self.scores(list, &mut raw);
        }
        if SCORE_FIELDS.iter().all(|f| raw.get(f).is_empty()) {
            if let Some(list) = content.select(&self.s.any_list).next() {
                self.scores(list, &mut raw);
            }
        }

        if raw.get("total_students").is_empty() {
            if let Some(total) = content
                .select(&self.s.info_header)
                .next()
                .and_then(|h| h.select(&self.s.quantity).next())
            {
                raw.set("total_students", clean(&text_of(total)));
            }
        }

        self.classrooms(content, &mut raw);

        tracing::debug!(
            name = raw.get(NAME_FIELD),
            total_students = raw.get("total_students"),
            total_classes = raw.get("total_classes"),
            total_classrooms = raw.get("total_classrooms"),
            "Extracted detail fields"
        );

        Ok(raw)
    }
}
