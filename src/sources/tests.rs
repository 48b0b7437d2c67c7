use std::fs;

use super::*;

const LAYOUT_XML: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE pdf2xml SYSTEM "pdf2xml.dtd">
<pdf2xml producer="poppler" version="23.08.0">
<page number="1" position="absolute" top="0" left="0" height="792" width="612">
	<fontspec id="0" size="10" family="Arial" color="#000000"/>
	<fontspec id="1" size="10" family="Arial,Bold" color="#000000"/>
<text top="120" left="150" width="240" height="11" font="0">Esta Ley es de orden p&#250;blico.</text>
<text top="121" left="85" width="60" height="11" font="1"><b>Art&#237;culo 1o.-</b></text>
<text top="140" left="120" width="30" height="11" font="0">I. Re</text>
<text top="140" left="150" width="100" height="11" font="0">gular &amp; medir;</text>
<text top="760" left="300" width="10" height="11" font="0">1</text>
</page>
</pdf2xml>
"##;

const DOCUMENT_XML: &str = r##"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>CAPÍTULO I</w:t></w:r></w:p>
<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Artículo 1o.- </w:t></w:r><w:r><w:t>Texto inicial.</w:t></w:r></w:p>
<w:p><w:pPr><w:ind w:left="720" w:hanging="360"/></w:pPr><w:r><w:t>I.</w:t></w:r><w:r><w:tab/><w:t>Primera fracción.</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:br w:type="page"/></w:r></w:p>
<w:p><w:r><w:rPr><w:b w:val="0"/></w:rPr><w:t>Artículo 2o.- Otro texto.</w:t></w:r></w:p>
</w:body>
</w:document>
"##;

#[test]
fn layout_runs_sharing_a_baseline_merge_into_one_line() {
    let pages = layout::parse_layout_xml(LAYOUT_XML).expect("layout xml should parse");
    assert_eq!(pages.len(), 1);

    let lines = &pages[0];
    assert_eq!(lines[0].text, "Artículo 1o.- Esta Ley es de orden público.");
    assert_eq!(lines[0].left, Some(85.0));
    assert!(lines[0].font.bold);
    assert_eq!(lines[0].lead_emphasis.as_deref(), Some("Artículo 1o.-"));

    // Runs that touch are joined without an inserted space.
    assert_eq!(lines[1].text, "I. Regular & medir;");
    assert_eq!(lines[1].left, Some(120.0));
    assert_eq!(lines[1].lead_emphasis, None);
}

#[test]
fn docx_paragraphs_carry_indent_emphasis_and_pages() {
    let pages = docx::parse_document_xml(DOCUMENT_XML).expect("document xml should parse");
    assert_eq!(pages.len(), 2);

    let first = &pages[0];
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].text, "CAPÍTULO I");
    assert_eq!(first[1].lead_emphasis.as_deref(), Some("Artículo 1o.-"));
    assert_eq!(first[1].left, Some(0.0));
    assert_eq!(first[2].text, "I. Primera fracción.");
    assert_eq!(first[2].left, Some(36.0));

    let second = &pages[1];
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].page, 2);
    assert!(!second[0].font.bold);
    assert_eq!(second[0].lead_emphasis, None);
}

#[test]
fn plain_pages_split_on_form_feed() {
    let pages = plain::split_pages("Artículo 1o.- Uno.\n\n2\n\u{000C}Artículo 2o.- Dos.\n\u{000C}\n");
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].len(), 2);
    assert_eq!(pages[1][0].page, 2);
    assert!(pages[1][0].left.is_none());
}

#[test]
fn missing_and_empty_files_are_unavailable() {
    let dir = tempfile::tempdir().expect("temp dir should be created");

    let missing = dir.path().join("absent.xml");
    let error = read_source(SourceKind::PdfLayout, &missing).expect_err("missing file should fail");
    assert!(matches!(
        error.downcast_ref::<PipelineError>(),
        Some(PipelineError::SourceUnavailable { .. })
    ));

    let empty = dir.path().join("empty.txt");
    fs::write(&empty, "").expect("fixture should be written");
    let outcome = try_read_source(SourceKind::PlainText, &empty).expect("unavailability is not fatal");
    assert_eq!(outcome.err().as_deref(), Some("zero-length file"));
}

#[test]
fn read_source_normalizes_and_hashes() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("LEY.xml");
    fs::write(&path, LAYOUT_XML).expect("fixture should be written");

    let stream = read_source(SourceKind::PdfLayout, &path).expect("source should read");
    assert_eq!(stream.file_name, "LEY.xml");
    assert_eq!(stream.sha256.len(), 64);
    assert_eq!(stream.stats.page_numbers_removed, 1);
    assert_eq!(stream.tokens.len(), 2);
}

#[test]
fn xml_entities_decode() {
    assert_eq!(decode_xml_entities("a &amp; b &#233; &#xE1;&nbsp;c &bogus;"), "a & b é á c &bogus;");
}
