// src/domain/template.rs
use serde::{Deserialize, Serialize};

/// Schema for one note type on the structured side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: i64,
    pub name: String,
    pub field_names: Vec<String>,
    pub templates: Vec<DisplayTemplate>,
    pub date_modified: i64,
}

/// One rendering template of a model; `question` and `answer` are format
/// strings referencing fields as `{{FieldName}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayTemplate {
    pub name: String,
    pub question: String,
    pub answer: String,
}

impl Model {
    pub fn references_field(&self, field_name: &str) -> bool {
        let marker = format!("{{{{{field_name}}}}}");
        self.templates
            .iter()
            .any(|t| t.question.contains(&marker) || t.answer.contains(&marker))
    }
}

/// Schema counterpart of a note on the file side: field name list plus the
/// model identity, no field content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub model_id: i64,
    pub model_name: String,
    pub field_names: Vec<String>,
    pub tags: Vec<String>,
    pub date_modified: i64,
}

impl Template {
    pub fn from_model(model: &Model) -> Self {
        Self {
            model_id: model.id,
            model_name: model.name.clone(),
            field_names: model.field_names.clone(),
            tags: Vec::new(),
            date_modified: model.date_modified,
        }
    }
}
