// src/application/template_sync.rs
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::application::orchestrator::SyncReport;
use crate::application::store::NoteStore;
use crate::domain::Template;
use crate::infrastructure::config::Config;
use crate::infrastructure::note_file::{parse_template_file, serialize_template};
use crate::infrastructure::path_builder::template_file_name;
use crate::infrastructure::vault::Vault;

/// Reconcile schemas and their template files.
///
/// Template files carry structure, not content: one per model in the
/// templates subfolder. A template file for a model the store has never
/// seen creates the schema; afterwards every model gets its template file
/// created or rebuilt when stale, and the configured link-back field is
/// injected into (or removed from) the schema with display-template
/// back-propagation.
pub fn sync_templates<S: NoteStore>(
    store: &mut S,
    vault: &Vault,
    config: &Config,
    report: &mut SyncReport,
) -> Result<()> {
    let templates_dir = vault.templates_dir().to_path_buf();
    std::fs::create_dir_all(&templates_dir).with_context(|| {
        format!("Failed to create templates folder {}", templates_dir.display())
    })?;

    adopt_new_template_files(store, vault, report)?;

    let models = store.models()?;
    for model in models {
        let mut model = model;

        match config.active_linkback() {
            Some(linkback) if !model.field_names.iter().any(|n| n == linkback) => {
                info!(model = %model.name, field = linkback, "Injecting link-back field");
                store.add_model_field(model.id, linkback)?;
                model = store.model_by_name(&model.name)?.unwrap_or(model);
            }
            None if !config.sync.linkback_field.is_empty()
                && model
                    .field_names
                    .iter()
                    .any(|n| n == &config.sync.linkback_field) =>
            {
                info!(
                    model = %model.name,
                    field = %config.sync.linkback_field,
                    "Removing link-back field"
                );
                store.remove_model_field(model.id, &config.sync.linkback_field)?;
                model = store.model_by_name(&model.name)?.unwrap_or(model);
            }
            _ => {}
        }

        let template = Template::from_model(&model);
        let rendered = serialize_template(&template, config.vault.heading_level);
        let path = templates_dir.join(template_file_name(&model.name));
        let stale = match std::fs::read_to_string(&path) {
            Ok(existing) => existing != rendered,
            Err(_) => true,
        };
        if stale {
            vault.write_file(&path, &rendered)?;
            report.templates_written += 1;
            debug!(model = %model.name, "Wrote template file");
        }
    }
    Ok(())
}

/// A template file naming a model the store doesn't have yet defines that
/// schema; create it so notes of that type can sync.
fn adopt_new_template_files<S: NoteStore>(
    store: &mut S,
    vault: &Vault,
    report: &mut SyncReport,
) -> Result<()> {
    let known: BTreeSet<String> = store.models()?.into_iter().map(|m| m.name).collect();

    let entries = match std::fs::read_dir(vault.templates_dir()) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template file {}", path.display()))?;
        let template = match parse_template_file(&content) {
            Ok(template) => template,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unparseable template file");
                report
                    .warnings
                    .push(format!("unparseable template file {}", path.display()));
                continue;
            }
        };
        if known.contains(&template.model_name) {
            continue;
        }

        let question = template
            .field_names
            .first()
            .map(|n| format!("{{{{{n}}}}}"))
            .unwrap_or_default();
        let answer = match template.field_names.get(1) {
            Some(second) => format!("{question}<hr>{{{{{second}}}}}"),
            None => question.clone(),
        };
        let model = crate::domain::Model {
            id: 0,
            name: template.model_name.clone(),
            field_names: template.field_names.clone(),
            templates: vec![crate::domain::DisplayTemplate {
                name: "Card 1".to_string(),
                question,
                answer,
            }],
            date_modified: 0,
        };
        let id = store.create_model(&model)?;
        info!(name = %model.name, id, "Created model from template file");
    }
    Ok(())
}
