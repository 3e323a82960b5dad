use crate::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const OPTIONS_KEY: &str = "options";
pub const CORRECT_OPTION_KEY: &str = "correctOption";
pub const MATCH_COLUMNS_KEY: &str = "matchColumns";
pub const IMAGE_PATH_KEY: &str = "imagePath";

/// Option slots offered by the editor.
pub const MAX_OPTIONS: usize = 4;

/// Two-column match table, stored column by column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchColumns {
    #[serde(rename = "columnA", default)]
    pub column_a: Vec<String>,
    #[serde(rename = "columnB", default)]
    pub column_b: Vec<String>,
}

impl MatchColumns {
    pub fn rows(&self) -> usize {
        self.column_a.len().max(self.column_b.len())
    }

    /// Pads the shorter column with empty cells.
    pub fn squared(mut self) -> Self {
        let rows = self.rows();
        self.column_a.resize(rows, String::new());
        self.column_b.resize(rows, String::new());
        self
    }

    pub fn push_row(&mut self) {
        let rows = self.rows();
        self.column_a.resize(rows + 1, String::new());
        self.column_b.resize(rows + 1, String::new());
    }

    pub fn pop_row(&mut self) {
        let rows = self.rows().saturating_sub(1);
        self.column_a.truncate(rows);
        self.column_b.truncate(rows);
    }
}

/// Typed view of the structured question fields kept in [`Record::extra`].
///
/// `correct_option` is 1-based, as in the OCR files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionFields {
    pub options: Vec<String>,
    pub correct_option: Option<u32>,
    pub match_columns: Option<MatchColumns>,
    pub image_path: Option<String>,
}

/// A structured field that cannot be saved as it stands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("question text cannot be empty")]
    EmptyText,
    #[error("at least 2 options required, found {found}")]
    TooFewOptions { found: usize },
    #[error("option {slot} is empty")]
    BlankOption { slot: usize },
    #[error("correct option must be a number between 1 and {options}")]
    MissingCorrectOption { options: usize },
    #[error("correct option {value} is out of range 1..={options}")]
    CorrectOptionOutOfRange { value: u32, options: usize },
}

impl QuestionFields {
    pub fn from_extra(extra: &Map<String, Value>) -> Self {
        let options: Vec<String> = extra
            .get(OPTIONS_KEY)
            .and_then(Value::as_array)
            .map(|options| options.iter().filter(|value| !value.is_null()).map(display_value).collect())
            .unwrap_or_default();

        let correct_option = extra.get(CORRECT_OPTION_KEY).and_then(|value| match value {
            Value::Number(number) => number.as_u64().and_then(|number| u32::try_from(number).ok()),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        });

        let match_columns = extra
            .get(MATCH_COLUMNS_KEY)
            .filter(|value| value.is_object())
            .and_then(|value| serde_json::from_value::<MatchColumns>(value.clone()).ok())
            .map(MatchColumns::squared)
            .filter(|columns| columns.rows() > 0);

        let image_path = extra
            .get(IMAGE_PATH_KEY)
            .and_then(Value::as_str)
            .filter(|path| !path.is_empty())
            .map(ToOwned::to_owned);

        Self { options, correct_option, match_columns, image_path }
    }

    /// Drops trailing blank options and an empty match table.
    pub fn normalized(mut self) -> Self {
        while self.options.last().is_some_and(|option| option.trim().is_empty()) {
            self.options.pop();
        }
        self.match_columns = self.match_columns.map(MatchColumns::squared).filter(|columns| columns.rows() > 0);
        self.image_path = self.image_path.filter(|path| !path.trim().is_empty());
        self
    }

    /// Whether the record is a multiple-choice question, which is when the
    /// option rules apply.
    pub fn is_multiple_choice(&self) -> bool {
        !self.options.is_empty() || self.correct_option.is_some()
    }

    /// Checks `text` and these fields. An empty list means they can be saved.
    pub fn validate(&self, text: &str) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if text.trim().is_empty() {
            errors.push(FieldError::EmptyText);
        }
        if !self.is_multiple_choice() {
            return errors;
        }

        let options = self.options.len();
        if options < 2 {
            errors.push(FieldError::TooFewOptions { found: options });
        }
        for (index, option) in self.options.iter().enumerate() {
            if option.trim().is_empty() {
                errors.push(FieldError::BlankOption { slot: index + 1 });
            }
        }
        match self.correct_option {
            None => errors.push(FieldError::MissingCorrectOption { options }),
            Some(value) if value == 0 || value as usize > options => {
                errors.push(FieldError::CorrectOptionOutOfRange { value, options });
            }
            Some(_) => {}
        }
        errors
    }

    /// Writes the fields that differ from what `extra` already holds.
    /// Returns whether anything changed.
    pub fn write_to(&self, extra: &mut Map<String, Value>) -> bool {
        let current = Self::from_extra(extra);
        let mut changed = false;

        if current.options != self.options {
            set_or_remove(extra, OPTIONS_KEY, (!self.options.is_empty()).then(|| Value::from(self.options.clone())));
            changed = true;
        }
        if current.correct_option != self.correct_option {
            set_or_remove(extra, CORRECT_OPTION_KEY, self.correct_option.map(Value::from));
            changed = true;
        }
        if current.match_columns != self.match_columns {
            let columns = self.match_columns.as_ref().and_then(|columns| serde_json::to_value(columns).ok());
            set_or_remove(extra, MATCH_COLUMNS_KEY, columns);
            changed = true;
        }
        if current.image_path != self.image_path {
            set_or_remove(extra, IMAGE_PATH_KEY, self.image_path.clone().map(Value::from));
            changed = true;
        }
        changed
    }
}

impl Record {
    pub fn fields(&self) -> QuestionFields {
        QuestionFields::from_extra(&self.extra)
    }

    /// Stores normalized `fields` in `extra`. Returns whether anything changed.
    pub fn set_fields(&mut self, fields: QuestionFields) -> bool {
        let fields = fields.normalized();
        if self.fields().normalized() == fields {
            return false;
        }
        fields.write_to(&mut self.extra)
    }

    /// Validation errors for the record as it would be saved.
    pub fn validate(&self) -> Vec<FieldError> {
        self.fields().normalized().validate(self.corrected_text())
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn set_or_remove(extra: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    match value {
        Some(value) => {
            extra.insert(key.to_owned(), value);
        }
        None => {
            extra.remove(key);
        }
    }
}
