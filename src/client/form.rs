//! Multipart form assembly for job submissions.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::request::analysis::{DATA_PART, MI_DATA_PART};

/// Build a form from text fields and data files.
///
/// Files are read before anything is sent, so a missing or empty data
/// file is reported as a validation error.
pub(crate) async fn build_form(
    fields: Vec<(String, String)>,
    attachments: &[(&'static str, &Path)],
) -> ClientResult<Form> {
    let mut form = Form::new();

    for (name, value) in fields {
        form = form.text(name, value);
    }

    for &(part_name, path) in attachments {
        let field = field_for_part(part_name);
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ClientError::validation(field, format!("cannot read {}: {}", path.display(), e))
        })?;
        if bytes.is_empty() {
            return Err(ClientError::validation(
                field,
                format!("{} is empty", path.display()),
            ));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.csv", part_name));

        debug!(part = part_name, file = %path.display(), bytes = bytes.len(), "attaching data file");

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/csv")
            .map_err(|e| ClientError::Config {
                message: format!("invalid content type: {}", e),
            })?;
        form = form.part(part_name, part);
    }

    Ok(form)
}

/// Request parameter name behind a form part.
fn field_for_part(part_name: &str) -> &'static str {
    match part_name {
        DATA_PART => "datafile",
        MI_DATA_PART => "mi_datafile",
        _ => "attachment",
    }
}
