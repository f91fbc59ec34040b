//! Writes every report block to the text, markdown and HTML documents at once.

use comfy_table::{
    presets,
    Table,
};
use std::fmt::Write as _;
use ytc_config::i18n;

const PLACEHOLDER: &str = "--";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportWriter {
    pub txt: String,
    pub markdown: String,
    pub html: String,
}

impl ReportWriter {
    /// Unnumbered heading, `level` 1 being a top-level section.
    pub fn heading(&mut self, level: usize, text: &str) {
        let _ = writeln!(self.txt, "{text}");
        if level == 1 {
            let _ = writeln!(self.txt, "{}", "=".repeat(text.chars().count()));
        }
        self.txt.push('\n');
        let _ = writeln!(self.markdown, "{} {text}\n", "#".repeat(level + 1));
        let tag = (level + 1).min(6);
        let _ = writeln!(self.html, "<h{tag}>{}</h{tag}>", escape_html(text));
    }

    /// Heading numbered `N`, `N.M` or `N.M.K`; the depth follows the number.
    pub fn title(&mut self, number: &str, text: &str) {
        let level = number.split('.').count();
        let text = format!("{number} {text}");
        let _ = writeln!(self.html, "<a id=\"section-{number}\"></a>");
        self.heading(level, &text);
    }

    pub fn paragraph(&mut self, text: &str) {
        let _ = writeln!(self.txt, "{text}\n");
        let _ = writeln!(self.markdown, "{}\n", escape_markdown(text));
        let _ = writeln!(self.html, "<p>{}</p>", escape_html(text));
    }

    /// Verbatim block such as command output.
    pub fn code(&mut self, text: &str) {
        let text = text.trim_end();
        for line in text.lines() {
            let _ = writeln!(self.txt, "    {line}");
        }
        self.txt.push('\n');
        let _ = writeln!(self.markdown, "```\n{text}\n```\n");
        let _ = writeln!(self.html, "<pre>{}</pre>", escape_html(text));
    }

    pub fn table(&mut self, headers: &[String], rows: &[Vec<String>]) {
        if rows.is_empty() {
            self.paragraph(&i18n::t("report.no_data"));
            return;
        }

        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL).set_header(headers);
        for row in rows {
            table.add_row(row);
        }
        let _ = writeln!(self.txt, "{table}\n");

        let line = |cells: &[String]| {
            let cells: Vec<String> = cells.iter().map(|cell| escape_markdown_cell(cell)).collect();
            format!("| {} |", cells.join(" | "))
        };
        let _ = writeln!(self.markdown, "{}", line(headers));
        let _ = writeln!(self.markdown, "|{}", " --- |".repeat(headers.len()));
        for row in rows {
            let _ = writeln!(self.markdown, "{}", line(row));
        }
        self.markdown.push('\n');

        self.html.push_str("<table>\n<thead><tr>");
        for header in headers {
            let _ = write!(self.html, "<th>{}</th>", escape_html(header));
        }
        self.html.push_str("</tr></thead>\n<tbody>\n");
        for row in rows {
            self.html.push_str("<tr>");
            for cell in row {
                let _ = write!(self.html, "<td>{}</td>", escape_html(cell));
            }
            self.html.push_str("</tr>\n");
        }
        self.html.push_str("</tbody>\n</table>\n");
    }

    /// `name: value` pairs.
    pub fn list(&mut self, entries: &[(String, String)]) {
        self.html.push_str("<ul>\n");
        for (name, value) in entries {
            let value = if value.is_empty() { PLACEHOLDER } else { value };
            let _ = writeln!(self.txt, "- {name}: {value}");
            let _ = writeln!(self.markdown, "- **{}**: {}", escape_markdown(name), escape_markdown(value));
            let _ = writeln!(self.html, "<li><b>{}</b>: {}</li>", escape_html(name), escape_html(value));
        }
        self.txt.push('\n');
        self.markdown.push('\n');
        self.html.push_str("</ul>\n");
    }

    /// Error branch of an item: never anything from its payload.
    pub fn error(&mut self, error: &str, description: &str) {
        let or_placeholder = |text: &str| if text.is_empty() { PLACEHOLDER.to_string() } else { text.to_string() };
        let (error, description) = (or_placeholder(error), or_placeholder(description));
        let (error_label, description_label) = (i18n::t("report.error"), i18n::t("report.description"));

        let _ = writeln!(self.txt, "{error_label}: {error}\n{description_label}: {description}\n");
        let _ = writeln!(
            self.markdown,
            "> **{error_label}:** {}  \n> **{description_label}:** {}\n",
            escape_markdown(&error),
            escape_markdown(&description)
        );
        let _ = writeln!(
            self.html,
            "<div class=\"error\"><p><b>{error_label}:</b> {}</p><p><b>{description_label}:</b> {}</p></div>",
            escape_html(&error),
            escape_html(&description)
        );
    }

    /// Location of a file copied into the package.
    pub fn path(&mut self, path: &str) {
        let header = i18n::t("report.storage_path");
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_header(vec![header.as_str()])
            .add_row(vec![path]);
        let _ = writeln!(self.txt, "{table}\n");
        let _ = writeln!(self.markdown, "| {header} |\n| --- |\n| [{0}]({0}) |\n", escape_markdown_cell(path));
        let _ = writeln!(
            self.html,
            "<table>\n<thead><tr><th>{}</th></tr></thead>\n<tbody>\n<tr><td><a href=\"{1}\">{1}</a></td></tr>\n</tbody>\n</table>",
            escape_html(&header),
            escape_html(path)
        );
    }

    /// Chart anchor, filled client side from the graph payload.
    pub fn graph(&mut self, name: &str) {
        let _ = writeln!(self.html, "<div class=\"graph\" data-graph=\"{}\"></div>", escape_html(name));
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_markdown(text: &str) -> String {
    text.replace('*', "\\*").replace('_', "\\_")
}

fn escape_markdown_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbered_titles_nest() {
        let mut writer = ReportWriter::default();
        writer.title("2.3.1", "history");
        assert_eq!(writer.markdown, "#### 2.3.1 history\n\n");
        assert!(writer.html.contains("<h4>2.3.1 history</h4>"));
        assert_eq!(writer.txt, "2.3.1 history\n\n");
    }

    #[test]
    fn error_uses_placeholder() {
        ytc_config::i18n::init(ytc_config::Lang::En);
        let mut writer = ReportWriter::default();
        writer.error("sar: command not found", "");
        assert_eq!(writer.txt, "Error: sar: command not found\nDescription: --\n\n");
    }

    #[test]
    fn markdown_table_escapes_pipes() {
        ytc_config::i18n::init(ytc_config::Lang::En);
        let mut writer = ReportWriter::default();
        writer.table(
            &["name".to_string(), "value".to_string()],
            &[vec!["a|b".to_string(), "<x>".to_string()]],
        );
        assert!(writer.markdown.contains("| a\\|b | <x> |"));
        assert!(writer.html.contains("<td>&lt;x&gt;</td>"));
    }
}
