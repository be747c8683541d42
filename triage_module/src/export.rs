//! Run exports: CSV, JSON, and a plain HTML table of a run's summaries.

use crate::summary_store::Summary;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown export format: {0}")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Html,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Result<Self, ExportError> {
        match value {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "html" => Ok(ExportFormat::Html),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Html => "text/html; charset=utf-8",
        }
    }
}

pub fn export_summaries(
    summaries: &[Summary],
    format: ExportFormat,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => Ok(to_csv(summaries)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(summaries)?),
        ExportFormat::Html => Ok(to_html(summaries)),
    }
}

const CSV_HEADER: &str = "conversation_id,contact_name,phone,summary,topics,needs_response,suppress_response,last_message_at";

fn to_csv(summaries: &[Summary]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for s in summaries {
        let row = [
            csv_escape(&s.conversation_id),
            csv_escape(s.contact_name.as_deref().unwrap_or("")),
            csv_escape(&s.phone),
            csv_escape(&s.summary),
            csv_escape(&s.topics.join("; ")),
            s.needs_response.to_string(),
            s.suppress_response.to_string(),
            csv_escape(s.last_message_at.as_deref().unwrap_or("")),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Quote a field when it contains a comma, quote, or newline; double any
/// embedded quotes.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn to_html(summaries: &[Summary]) -> String {
    let mut out = String::from(
        "<table>\n<tr><th>Conversation</th><th>Contact</th><th>Phone</th>\
         <th>Summary</th><th>Topics</th><th>Needs response</th></tr>\n",
    );
    for s in summaries {
        out.push_str("<tr>");
        for cell in [
            s.conversation_id.as_str(),
            s.contact_name.as_deref().unwrap_or(""),
            s.phone.as_str(),
            s.summary.as_str(),
        ] {
            out.push_str("<td>");
            out.push_str(&html_escape(cell));
            out.push_str("</td>");
        }
        out.push_str("<td>");
        out.push_str(&html_escape(&s.topics.join(", ")));
        out.push_str("</td><td>");
        out.push_str(if s.needs_response { "yes" } else { "no" });
        out.push_str("</td></tr>\n");
    }
    out.push_str("</table>\n");
    out
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
