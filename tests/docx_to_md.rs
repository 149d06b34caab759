//! End-to-end `.docx` → Markdown conversion through a real pandoc binary.
//!
//! Skipped (with a note on stderr) when pandoc is not installed.

use std::io::Write;
use std::path::Path;

use kbserve::convert::{ConvertError, DocxToMarkdown};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hello World</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

fn pandoc_available() -> bool {
    std::process::Command::new("pandoc")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

/// Minimal single-paragraph Word document.
fn write_docx(path: &Path) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", RELS),
        ("word/document.xml", DOCUMENT),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

#[tokio::test]
async fn test_docx_to_markdown() {
    if !pandoc_available() {
        eprintln!("pandoc not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hello.docx");
    write_docx(&input);

    let markdown = DocxToMarkdown::new(&input)
        .run("pandoc", 30_000)
        .await
        .unwrap();
    assert!(markdown.contains("Hello World"), "got: {markdown}");
}

#[tokio::test]
async fn test_docx_to_markdown_file_output() {
    if !pandoc_available() {
        eprintln!("pandoc not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hello.docx");
    let output = dir.path().join("hello.md");
    write_docx(&input);

    let job = DocxToMarkdown {
        input,
        output: Some(output.clone()),
        extract_media: Some(dir.path().join("media")),
    };
    job.run("pandoc", 30_000).await.unwrap();
    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains("Hello World"));
}

#[tokio::test]
async fn test_invalid_docx_is_rejected() {
    if !pandoc_available() {
        eprintln!("pandoc not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.docx");
    std::fs::write(&input, b"this is not a zip archive").unwrap();

    let err = DocxToMarkdown::new(&input)
        .run("pandoc", 30_000)
        .await
        .unwrap_err();
    match err {
        ConvertError::Failed { exit_code, .. } => assert_ne!(exit_code, 0),
        other => panic!("expected pandoc failure, got {other}"),
    }
}
