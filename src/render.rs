//! Markdown pipeline: HTML rendering for readers, list previews, export
//! documents and the snippets inserted into a note after an upload.

use crate::storage::{format_file_size, FileType, UploadedFile};
use crate::tables::Note;
use lazy_static::lazy_static;
use pulldown_cmark::escape::{escape_href, escape_html};
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag};
use regex::Regex;

pub const PREVIEW_CHARS: usize = 150;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r#"https?://[^\s"'<>()\[\]]+"#).unwrap();
}

// Writes into a String cannot fail, so the io::Result is dropped below
fn html_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let _ = escape_html(&mut escaped, value);
    escaped
}

fn is_external(dest: &str) -> bool {
    dest.starts_with("http://") || dest.starts_with("https://")
}

fn open_link(dest: &str, title: &str, extra: &str) -> String {
    let mut tag = String::from(r#"<a href=""#);
    let _ = escape_href(&mut tag, dest);
    tag.push('"');
    if !title.is_empty() {
        tag.push_str(r#" title=""#);
        let _ = escape_html(&mut tag, title);
        tag.push('"');
    }
    tag.push_str(extra);
    tag.push('>');
    tag
}

/// Renders note Markdown to HTML.
///
/// Links into `uploads_prefix` become download links, other absolute links
/// open in a new tab. Raw HTML (embedded `<video>`/`<iframe>` blocks) is
/// passed through unchanged.
pub fn markdown_to_html(markdown: &str, uploads_prefix: Option<&str>) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Start(Tag::Link(link_type, dest, title)) if link_type != LinkType::Email => {
            let is_upload = uploads_prefix.is_some_and(|p| dest.starts_with(p));
            if is_upload {
                Event::Html(CowStr::from(open_link(&dest, &title, r#" class="file-link" download"#)))
            } else if is_external(&dest) {
                Event::Html(CowStr::from(open_link(
                    &dest,
                    &title,
                    r#" target="_blank" rel="noopener noreferrer""#,
                )))
            } else {
                Event::Start(Tag::Link(link_type, dest, title))
            }
        }
        other => other,
    });

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    html_output
}

/// Plain-text excerpt for note cards: Markdown markers stripped, newlines
/// flattened, cut at [`PREVIEW_CHARS`] characters.
pub fn note_preview(content: &str) -> String {
    let plain: String = content
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '`'))
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    if plain.chars().count() > PREVIEW_CHARS {
        let cut: String = plain.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        plain
    }
}

/// Standalone Markdown document for a note.
pub fn export_markdown(note: &Note, category_name: Option<&str>) -> String {
    let tags = if note.tags.is_empty() {
        "None".to_string()
    } else {
        note.tags.join(", ")
    };
    format!(
        "# {}\n\n**Category:** {}\n**Last Updated:** {}\n**Tags:** {}\n\n---\n\n{}\n",
        note.title,
        category_name.unwrap_or("Uncategorized"),
        note.updated_at.format("%Y-%m-%d"),
        tags,
        note.content.trim_end()
    )
}

/// `My Note: v2` -> `my_note__v2.md`
pub fn export_file_name(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.md", stem)
}

/// Markdown inserted into a note after uploading a file.
pub fn embed_snippet(file: &UploadedFile) -> String {
    match file.file_type {
        FileType::Image => format!("![{}]({})\n\n", file.name, file.url),
        FileType::Video => format!(
            "<video controls width=\"100%\">\n  <source src=\"{}\" type=\"video/mp4\">\n  Your browser does not support the video tag.\n</video>\n\n",
            html_attr(&file.url)
        ),
        FileType::Pdf => format!(
            "## {}\n\n<iframe src=\"{}\" width=\"100%\" height=\"600\" class=\"pdf-iframe\"></iframe>\n\n[Download PDF]({})\n\n",
            file.name,
            html_attr(&file.url),
            file.url
        ),
        FileType::Document | FileType::File => format!(
            "[{}]({}) ({})\n\n",
            file.name,
            file.url,
            format_file_size(file.size)
        ),
    }
}

/// Uploaded-file URLs referenced by `content`, in first-seen order.
pub fn attachment_urls(content: &str, uploads_prefix: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in URL_RE.find_iter(content) {
        let url = m.as_str();
        if url.starts_with(uploads_prefix) && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const PREFIX: &str = "http://localhost:37240/uploads/";

    fn uploaded(file_type: FileType, name: &str) -> UploadedFile {
        UploadedFile {
            id: "1700000000000-abcdef0123".to_string(),
            name: name.to_string(),
            url: format!("{}general/1700000000000-abcdef0123", PREFIX),
            file_type,
            size: 2048,
            path: "general/1700000000000-abcdef0123".to_string(),
        }
    }

    #[test]
    fn test_markdown_to_html_basic() {
        let html = markdown_to_html("# Ownership\n\nMove semantics.", None);
        assert!(html.contains("<h1>Ownership</h1>"));
        assert!(html.contains("<p>Move semantics.</p>"));
    }

    #[test]
    fn test_markdown_to_html_tables_and_tasks() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n\n- [x] done", None);
        assert!(html.contains("<table>"));
        assert!(html.contains("checkbox"));
    }

    #[test]
    fn test_external_links_open_in_new_tab() {
        let html = markdown_to_html("[docs](https://doc.rust-lang.org \"Rust\")", Some(PREFIX));
        assert!(html.contains(
            r#"<a href="https://doc.rust-lang.org" title="Rust" target="_blank" rel="noopener noreferrer">docs</a>"#
        ));
    }

    #[test]
    fn test_upload_links_are_downloads() {
        let markdown = format!("[slides]({}general/a.pdf)", PREFIX);
        let html = markdown_to_html(&markdown, Some(PREFIX));
        assert!(html.contains(r#"class="file-link" download>slides</a>"#));
        assert!(!html.contains("_blank"));
    }

    #[test]
    fn test_rewritten_links_escape_like_plain_links() {
        let html = markdown_to_html(
            "[q](https://example.com/?a=1&b=2 \"say \\\"hi\\\"\") [r](/search?a=1&b=2)",
            Some(PREFIX),
        );
        assert!(html.contains(
            r#"<a href="https://example.com/?a=1&amp;b=2" title="say &quot;hi&quot;""#
        ));
        assert!(html.contains(r#"<a href="/search?a=1&amp;b=2">r</a>"#));
    }

    #[test]
    fn test_relative_links_untouched() {
        let html = markdown_to_html("[next](/notes/2)", Some(PREFIX));
        assert!(html.contains(r#"<a href="/notes/2">next</a>"#));
    }

    #[test]
    fn test_embedded_html_passes_through() {
        let pdf = embed_snippet(&uploaded(FileType::Pdf, "Paper"));
        let html = markdown_to_html(&pdf, Some(PREFIX));
        assert!(html.contains("<iframe src=\""));
        assert!(html.contains("<h2>Paper</h2>"));

        let video = embed_snippet(&uploaded(FileType::Video, "Demo"));
        let html = markdown_to_html(&video, Some(PREFIX));
        assert!(html.contains("<video controls"));
    }

    #[test]
    fn test_note_preview() {
        assert_eq!(note_preview("# Title\n`code` and **bold**"), " Title code and bold");
        let long = "a".repeat(200);
        let preview = note_preview(&long);
        assert_eq!(preview.len(), PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
        // Multi-byte characters are cut on char boundaries
        let wide = "é".repeat(151);
        assert_eq!(note_preview(&wide).chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(note_preview(&"b".repeat(150)), "b".repeat(150));
    }

    #[test]
    fn test_export_markdown() {
        let note = Note {
            id: "n1".to_string(),
            title: "Lifetimes".to_string(),
            content: "Body text\n\n".to_string(),
            category_id: Some("c1".to_string()),
            folder_id: None,
            tags: vec!["rust".to_string(), "borrowck".to_string()],
            is_archived: false,
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap(),
        };
        let doc = export_markdown(&note, Some("Rust"));
        assert_eq!(
            doc,
            "# Lifetimes\n\n**Category:** Rust\n**Last Updated:** 2024-03-09\n**Tags:** rust, borrowck\n\n---\n\nBody text\n"
        );

        let untagged = Note {
            tags: vec![],
            ..note
        };
        let doc = export_markdown(&untagged, None);
        assert!(doc.contains("**Category:** Uncategorized"));
        assert!(doc.contains("**Tags:** None"));
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(export_file_name("My Note: v2"), "my_note__v2.md");
        assert_eq!(export_file_name("Rust"), "rust.md");
    }

    #[test]
    fn test_embed_snippets() {
        let image = embed_snippet(&uploaded(FileType::Image, "diagram.png"));
        assert!(image.starts_with("![diagram.png](http://localhost:37240/uploads/general/"));

        let doc = embed_snippet(&uploaded(FileType::Document, "notes.docx"));
        assert!(doc.starts_with("[notes.docx]("));
        assert!(doc.contains("(2 KB)"));
    }

    #[test]
    fn test_attachment_urls() {
        let content = format!(
            "![a]({p}general/a.png)\n<iframe src=\"{p}docs/b.pdf\"></iframe>\n[a again]({p}general/a.png)\n[site](https://example.com/x)",
            p = PREFIX
        );
        assert_eq!(
            attachment_urls(&content, PREFIX),
            vec![
                format!("{}general/a.png", PREFIX),
                format!("{}docs/b.pdf", PREFIX)
            ]
        );
    }
}
