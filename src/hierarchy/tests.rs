use super::paragraphs::{ParagraphArena, ParagraphBuilder};
use super::patterns::{LineFlow, LineRole};
use super::*;
use crate::config::{BandPolicy, LayoutProfile};
use crate::model::{
    DivisionKind, DocumentKind, IssueKind, ParagraphKind, SkeletonDivision, SourceKind,
    StructureSkeleton,
};
use crate::sources::{NormalizationStats, Token, TokenStream};

fn patterns() -> LinePatterns {
    LinePatterns::new().expect("line patterns should compile")
}

fn stream(lines: &[&str]) -> TokenStream {
    TokenStream {
        source: SourceKind::PlainText,
        file_name: "LEY.txt".to_string(),
        sha256: "0".repeat(64),
        tokens: lines.iter().map(|line| Token::plain(1, *line)).collect(),
        stats: NormalizationStats::default(),
    }
}

const LAW_LINES: &[&str] = &[
    "TÍTULO PRIMERO",
    "DISPOSICIONES GENERALES",
    "CAPÍTULO I",
    "Del Objeto",
    "Artículo 1o.- Esta Ley regula el impuesto.",
    "Artículo reformado DOF 12-11-2021",
    "Artículo 2o.- Son sujetos:",
    "I. Las personas físicas;",
    "II. Las personas morales.",
    "CAPÍTULO II De los Sujetos",
    "Artículo 3o.- Los residentes en el país.",
    "TÍTULO SEGUNDO De las Personas Morales",
    "Artículo 4o.- Las personas morales pagarán el impuesto.",
    "TRANSITORIOS",
    "PRIMERO.- El presente Decreto entra en vigor.",
    "SEGUNDO.- Se abroga la ley anterior.",
];

fn law_skeleton() -> StructureSkeleton {
    build_skeleton("LEY", DocumentKind::Law, &stream(LAW_LINES), &patterns())
        .expect("skeleton should build")
}

#[test]
fn classify_recognizes_headings_headers_and_annotations() {
    let patterns = patterns();

    assert_eq!(
        patterns.classify("CAPÍTULO II", false, DocumentKind::Law),
        LineRole::DivisionHeading {
            kind: DivisionKind::Chapter,
            number: "II".to_string(),
            value: 2,
            name: String::new(),
        }
    );
    assert_eq!(
        patterns.classify("Capítulo II de esta Ley", false, DocumentKind::Law),
        LineRole::Body
    );
    assert_eq!(
        patterns.classify("Artículo 5o.- Para efectos de esta Ley", false, DocumentKind::Law),
        LineRole::ArticleHeader {
            raw_id: "5o".to_string(),
            rest: "Para efectos de esta Ley".to_string(),
            rule: false,
            dashed: true,
        }
    );
    assert_eq!(
        patterns.classify("Capítulo I ........ 12", false, DocumentKind::Law),
        LineRole::TableOfContents
    );
    assert_eq!(
        patterns.classify("TRANSITORIOS", false, DocumentKind::Law),
        LineRole::TransitionalHeading
    );
    assert_eq!(
        patterns.classify("Fracción adicionada DOF 09-12-2019", false, DocumentKind::Law),
        LineRole::AmendmentNote
    );
}

#[test]
fn cross_references_are_not_headings() {
    let patterns = patterns();

    assert_eq!(
        patterns.classify(
            "Capítulo II, Sección Segunda de la Ley Federal del Trabajo, aplica.",
            false,
            DocumentKind::Law
        ),
        LineRole::Body
    );
    assert_eq!(
        patterns.classify("Artículo 2o. de esta Ley se estará a lo siguiente.", false, DocumentKind::Law),
        LineRole::Body
    );
}

#[test]
fn undashed_header_inside_an_open_clause_is_body() {
    let patterns = patterns();
    let mut flow = LineFlow::default();
    flow.advance(&LineRole::Body, "Para los efectos de lo dispuesto en el");

    assert_eq!(
        patterns.classify_in_flow("Artículo 27. Fracción III de esta Ley.", flow, false, DocumentKind::Law),
        LineRole::Body
    );
    assert!(matches!(
        patterns.classify_in_flow("Artículo 28.- Los contribuyentes", flow, false, DocumentKind::Law),
        LineRole::ArticleHeader { dashed: true, .. }
    ));

    flow.close();
    assert!(matches!(
        patterns.classify_in_flow("Artículo 27. Fracción III de esta Ley.", flow, false, DocumentKind::Law),
        LineRole::ArticleHeader { dashed: false, .. }
    ));
}

#[test]
fn transitional_mode_accepts_spelled_ordinals() {
    let patterns = patterns();

    match patterns.classify("PRIMERO.- El presente Decreto entra en vigor.", true, DocumentKind::Law) {
        LineRole::ArticleHeader { raw_id, rest, rule, .. } => {
            assert_eq!(raw_id, "PRIMERO");
            assert_eq!(rest, "El presente Decreto entra en vigor.");
            assert!(!rule);
        }
        other => panic!("expected transitional header, got {other:?}"),
    }
    assert_eq!(
        patterns.classify("PRIMERO.- El presente Decreto entra en vigor.", false, DocumentKind::Law),
        LineRole::Body
    );
}

#[test]
fn rule_headers_only_apply_to_resolutions() {
    let patterns = patterns();

    assert_eq!(
        patterns.classify("2.1.1. Para los efectos del artículo 9", false, DocumentKind::Resolution),
        LineRole::ArticleHeader {
            raw_id: "2.1.1".to_string(),
            rest: "Para los efectos del artículo 9".to_string(),
            rule: true,
            dashed: false,
        }
    );
    assert_eq!(
        patterns.classify("2.1.1. Para los efectos del artículo 9", false, DocumentKind::Law),
        LineRole::Body
    );
}

#[test]
fn leading_shape_reads_paragraph_markers() {
    let patterns = patterns();

    let cases = [
        ("III. Las personas", ParagraphKind::Fraction, "III", "Las personas"),
        ("a) Los avisos", ParagraphKind::SubItem, "a", "Los avisos"),
        ("1. Cuando proceda", ParagraphKind::Numeral, "1", "Cuando proceda"),
        ("B. Otros ingresos", ParagraphKind::HeadingLetter, "B", "Otros ingresos"),
        ("C. Tercero", ParagraphKind::Fraction, "C", "Tercero"),
        ("La persona obligada", ParagraphKind::Text, "", "La persona obligada"),
    ];

    for (line, kind, label, body) in cases {
        let shape = patterns.leading_shape(line);
        assert_eq!(shape.kind, kind, "kind for {line}");
        assert_eq!(shape.label, label, "label for {line}");
        assert_eq!(shape.body, body, "body for {line}");
    }
}

#[test]
fn arena_rejects_missing_parent() {
    let mut arena = ParagraphArena::default();
    let root = arena
        .push(None, ParagraphKind::Fraction, "I".to_string(), "Uno.".to_string(), 1)
        .expect("root push should succeed");
    arena
        .push(Some(root), ParagraphKind::SubItem, "a".to_string(), "Inciso.".to_string(), 2)
        .expect("child push should succeed");

    assert!(
        arena
            .push(Some(7), ParagraphKind::Text, String::new(), "x".to_string(), 1)
            .is_err()
    );
    assert_eq!(arena.children(Some(root)).count(), 1);
    assert_eq!(arena.len(), 2);
}

#[test]
fn paragraph_stack_follows_bands_and_markers() {
    let patterns = patterns();
    let layout = LayoutProfile::default();
    let bands = layout.bands_for(SourceKind::PdfLayout);
    let mut builder = ParagraphBuilder::new(&patterns, bands, BandPolicy::Lenient, "27", "Son obligaciones:");

    for (text, left) in [
        ("I. Inscribirse en el registro;", 110.0),
        ("a) Presentar avisos;", 150.0),
        ("Párrafo adicional del inciso.", 150.0),
        ("b) Conservar la", 150.0),
        ("contabilidad.", 150.0),
        ("II. Expedir comprobantes.", 110.0),
        ("Lo anterior aplica también a terceros.", 85.0),
    ] {
        builder
            .push_line(&Token::positioned(3, text, left))
            .expect("line should attach");
    }

    let body = builder.finish();
    assert_eq!(body.intro, "Son obligaciones:");
    assert!(body.issues.is_empty());

    let shape = body
        .paragraphs
        .iter()
        .map(|node| (node.kind, node.label.as_str(), node.parent, node.depth))
        .collect::<Vec<_>>();
    assert_eq!(
        shape,
        vec![
            (ParagraphKind::Fraction, "I", None, 1),
            (ParagraphKind::SubItem, "a", Some(0), 2),
            (ParagraphKind::Text, "", Some(1), 2),
            (ParagraphKind::SubItem, "b", Some(0), 2),
            (ParagraphKind::Fraction, "II", None, 1),
            (ParagraphKind::Text, "", None, 0),
        ]
    );
    assert_eq!(body.paragraphs[3].text, "Conservar la contabilidad.");
}

#[test]
fn shallower_line_does_not_run_on() {
    let patterns = patterns();
    let layout = LayoutProfile::default();
    let bands = layout.bands_for(SourceKind::PdfLayout);
    let mut builder = ParagraphBuilder::new(&patterns, bands, BandPolicy::Lenient, "2.7.1", "");

    for (text, left) in [
        ("A. Personas morales", 110.0),
        ("Las personas morales presentarán la declaración anual.", 85.0),
    ] {
        builder
            .push_line(&Token::positioned(1, text, left))
            .expect("line should attach");
    }

    let body = builder.finish();
    let shape = body
        .paragraphs
        .iter()
        .map(|node| (node.kind, node.text.as_str(), node.parent, node.depth))
        .collect::<Vec<_>>();
    assert_eq!(
        shape,
        vec![
            (ParagraphKind::HeadingLetter, "Personas morales", None, 1),
            (
                ParagraphKind::Text,
                "Las personas morales presentarán la declaración anual.",
                None,
                0
            ),
        ]
    );
}

#[test]
fn docx_paragraphs_never_run_on() {
    let patterns = patterns();
    let layout = LayoutProfile::default();
    let bands = layout.bands_for(SourceKind::Docx);
    let mut builder =
        ParagraphBuilder::new(&patterns, bands, BandPolicy::Lenient, "2.7.1", "").paragraph_per_token();

    for (text, left) in [
        ("A. Personas morales", 20.0),
        ("Las personas morales presentarán la declaración anual.", 50.0),
    ] {
        builder
            .push_line(&Token::positioned(1, text, left))
            .expect("line should attach");
    }

    let body = builder.finish();
    assert_eq!(body.paragraphs.len(), 2);
    assert_eq!(body.paragraphs[0].kind, ParagraphKind::HeadingLetter);
    assert_eq!(body.paragraphs[0].text, "Personas morales");
    assert_eq!(body.paragraphs[1].kind, ParagraphKind::Text);
    assert_eq!(body.paragraphs[1].parent, Some(0));
}

#[test]
fn single_letter_after_heading_letter_is_not_a_fraction() {
    let patterns = patterns();
    let layout = LayoutProfile::default();
    let bands = layout.bands_for(SourceKind::PdfLayout);
    let mut builder = ParagraphBuilder::new(&patterns, bands, BandPolicy::Lenient, "2.7.1", "");

    for text in ["A. Primero.", "B. Segundo.", "C. Tercero.", "D. Cuarto."] {
        builder
            .push_line(&Token::positioned(1, text, 110.0))
            .expect("line should attach");
    }

    let body = builder.finish();
    assert!(
        body.paragraphs
            .iter()
            .all(|node| node.kind == ParagraphKind::HeadingLetter && node.depth == 1)
    );
    assert_eq!(body.paragraphs.len(), 4);
}

#[test]
fn roman_sequence_keeps_single_letter_fractions() {
    let patterns = patterns();
    let mut builder = ParagraphBuilder::new(&patterns, &[], BandPolicy::Lenient, "10", "");

    for text in ["IV. Cuarta.", "V. Quinta.", "VI. Sexta."] {
        builder
            .push_line(&Token::plain(1, text))
            .expect("line should attach");
    }

    let body = builder.finish();
    let labels = body
        .paragraphs
        .iter()
        .filter(|node| node.kind == ParagraphKind::Fraction)
        .map(|node| node.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["IV", "V", "VI"]);
}

#[test]
fn strict_policy_records_unbanded_lines() {
    let patterns = patterns();
    let layout = LayoutProfile::default();
    let bands = layout.bands_for(SourceKind::PdfLayout);

    for (policy, expected_issues) in [(BandPolicy::Lenient, 0), (BandPolicy::Strict, 1)] {
        let mut builder = ParagraphBuilder::new(&patterns, bands, policy, "8", "Texto inicial");
        builder
            .push_line(&Token::positioned(1, "que sigue fuera de margen.", 420.0))
            .expect("line should attach");

        let body = builder.finish();
        assert_eq!(body.unbanded_lines, 1);
        assert_eq!(body.intro, "Texto inicial que sigue fuera de margen.");
        assert_eq!(
            body.issues
                .iter()
                .filter(|issue| issue.kind == IssueKind::UnbandedLine)
                .count(),
            expected_issues
        );
    }
}

#[test]
fn empty_article_is_flagged() {
    let patterns = patterns();
    let builder = ParagraphBuilder::new(&patterns, &[], BandPolicy::Lenient, "9", "");

    let body = builder.finish();
    assert_eq!(body.issues.len(), 1);
    assert_eq!(body.issues[0].kind, IssueKind::EmptyBody);
}

fn assert_sums(node: &SkeletonDivision) {
    let nested = node
        .children
        .iter()
        .map(|child| child.total_article_count)
        .sum::<usize>();
    assert_eq!(node.total_article_count, node.article_count + nested, "{}", node.key);
    node.children.iter().for_each(assert_sums);
}

#[test]
fn skeleton_counts_and_keys_follow_nesting() {
    let skeleton = law_skeleton();

    let keys = skeleton
        .flatten()
        .into_iter()
        .map(|(parent, node)| (parent.map(str::to_string), node.key.clone(), node.order))
        .collect::<Vec<_>>();
    assert_eq!(
        keys,
        vec![
            (None, "titulo-1".to_string(), 0),
            (Some("titulo-1".to_string()), "titulo-1/capitulo-1".to_string(), 1),
            (Some("titulo-1".to_string()), "titulo-1/capitulo-2".to_string(), 2),
            (None, "titulo-2".to_string(), 3),
        ]
    );

    assert_eq!(skeleton.divisions[0].name, "DISPOSICIONES GENERALES");
    assert_eq!(skeleton.divisions[0].children[0].name, "Del Objeto");
    assert_eq!(skeleton.divisions[0].children[0].article_count, 2);
    assert_eq!(skeleton.divisions[0].total_article_count, 3);
    assert_eq!(skeleton.divisions[1].total_article_count, 1);
    assert_eq!(skeleton.root_article_count, 0);
    assert_eq!(skeleton.transitional_article_count, 2);
    assert_eq!(skeleton.total_article_count, 6);

    skeleton.divisions.iter().for_each(assert_sums);
    let top = skeleton
        .divisions
        .iter()
        .map(|division| division.total_article_count)
        .sum::<usize>();
    assert_eq!(
        skeleton.total_article_count,
        top + skeleton.root_article_count + skeleton.transitional_article_count
    );
}

#[test]
fn skeleton_rejects_section_outside_chapter() {
    let lines = [
        "SECCIÓN PRIMERA De los Avisos",
        "Artículo 1o.- Texto del artículo.",
    ];

    let error = build_skeleton("LEY", DocumentKind::Law, &stream(&lines), &patterns())
        .expect_err("section at root should be rejected");
    let message = error.to_string();
    assert!(message.contains("section PRIMERA"), "{message}");
    assert!(message.contains("the document root"), "{message}");
}

#[test]
fn skeleton_without_articles_is_an_error() {
    let lines = ["CAPÍTULO I Único", "Texto sin encabezados."];
    assert!(build_skeleton("LEY", DocumentKind::Law, &stream(&lines), &patterns()).is_err());
}

fn extract(lines: &[&str], skeleton: &StructureSkeleton) -> SourceExtraction {
    let patterns = patterns();
    let options = ExtractOptions {
        document_kind: DocumentKind::Law,
        bands: &[],
        policy: BandPolicy::Lenient,
    };
    extract_articles(&stream(lines), skeleton, &patterns, &options).expect("extract should succeed")
}

#[test]
fn extraction_attaches_articles_to_skeleton_divisions() {
    let skeleton = law_skeleton();
    let extraction = extract(LAW_LINES, &skeleton);

    let placement = extraction
        .articles
        .iter()
        .map(|article| (article.division_key.as_deref(), article.is_transitional))
        .collect::<Vec<_>>();
    assert_eq!(
        placement,
        vec![
            (Some("titulo-1/capitulo-1"), false),
            (Some("titulo-1/capitulo-1"), false),
            (Some("titulo-1/capitulo-2"), false),
            (Some("titulo-2"), false),
            (None, true),
            (None, true),
        ]
    );

    let first = &extraction.articles[0];
    assert_eq!(first.id, "1o");
    assert_eq!(first.intro, "Esta Ley regula el impuesto.");
    assert_eq!(first.amendments, vec!["Artículo reformado DOF 12-11-2021".to_string()]);
    assert!(first.paragraphs.is_empty());

    let second = &extraction.articles[1];
    assert_eq!(second.intro, "Son sujetos:");
    assert_eq!(second.paragraphs.len(), 2);
    assert!(second.paragraphs.iter().all(|node| node.kind == ParagraphKind::Fraction));

    let transitional = &extraction.articles[4];
    assert!(transitional.id.starts_with("T1:"), "{}", transitional.id);
    assert_eq!(transitional.transitional_block, Some(1));

    assert_eq!(
        extraction.division_names.get("titulo-1").map(String::as_str),
        Some("DISPOSICIONES GENERALES")
    );
    assert_eq!(
        extraction.division_names.get("titulo-1/capitulo-2").map(String::as_str),
        Some("De los Sujetos")
    );
    assert!(extraction.unmatched_headings.is_empty());
}

#[test]
fn repeated_identifier_is_suffixed_and_flagged() {
    let lines = [
        "Artículo 5o.- Primera versión.",
        "Artículo 5o.- Segunda versión.",
    ];
    let skeleton = build_skeleton("LEY", DocumentKind::Law, &stream(&lines), &patterns())
        .expect("skeleton should build");
    let extraction = extract(&lines, &skeleton);

    assert_eq!(extraction.articles[0].id, "5o");
    assert_eq!(extraction.articles[1].id, "5o~2");
    assert_eq!(extraction.articles[1].issues[0].kind, IssueKind::DuplicateIdentifier);
}

#[test]
fn emphasized_heading_becomes_article_title() {
    let mut token = Token::plain(1, "Artículo 5o.- Objeto. La presente Ley tiene por objeto regular.");
    token.lead_emphasis = Some("Artículo 5o.- Objeto.".to_string());
    let mut source = stream(&[]);
    source.tokens.push(token);

    let skeleton = build_skeleton("LEY", DocumentKind::Law, &source, &patterns())
        .expect("skeleton should build");
    let patterns = patterns();
    let options = ExtractOptions {
        document_kind: DocumentKind::Law,
        bands: &[],
        policy: BandPolicy::Lenient,
    };
    let extraction =
        extract_articles(&source, &skeleton, &patterns, &options).expect("extract should succeed");

    let article = &extraction.articles[0];
    assert_eq!(article.title.as_deref(), Some("Objeto."));
    assert_eq!(article.intro, "La presente Ley tiene por objeto regular.");
}

#[test]
fn headings_missing_from_the_skeleton_are_reported() {
    let skeleton = law_skeleton();
    let lines = [
        "CAPÍTULO IX Inexistente",
        "Artículo 1o.- Texto.",
    ];
    let extraction = extract(&lines, &skeleton);

    assert_eq!(extraction.unmatched_headings.len(), 1);
    assert_eq!(extraction.articles[0].division_key, None);
}

#[test]
fn wrapped_citations_do_not_open_articles() {
    let lines = [
        "CAPÍTULO I",
        "Artículo 1o.- Para los efectos de lo dispuesto en el",
        "Artículo 2o. de esta Ley se estará a lo siguiente.",
        "Artículo 2o.- Son sujetos del impuesto en términos del",
        "Artículo 1o. Bis, se consideran residentes.",
        "Artículo 3o.- Los residentes pagarán el impuesto.",
    ];
    let skeleton = build_skeleton("LEY", DocumentKind::Law, &stream(&lines), &patterns())
        .expect("skeleton should build");
    assert_eq!(skeleton.total_article_count, 3);

    let extraction = extract(&lines, &skeleton);
    let ids = extraction
        .articles
        .iter()
        .map(|article| article.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["1o", "2o", "3o"]);
    assert_eq!(
        extraction.articles[0].intro,
        "Para los efectos de lo dispuesto en el Artículo 2o. de esta Ley se estará a lo siguiente."
    );
    assert!(extraction.articles.iter().all(|article| article.issues.is_empty()));
}

#[test]
fn cross_reference_does_not_open_a_division() {
    let lines = [
        "CAPÍTULO I De los Sujetos",
        "Artículo 1o.- Son sujetos:",
        "Capítulo II, Sección Segunda de la Ley Federal del Trabajo, aplica.",
    ];
    let skeleton = build_skeleton("LEY", DocumentKind::Law, &stream(&lines), &patterns())
        .expect("skeleton should build");
    let keys = skeleton
        .flatten()
        .into_iter()
        .map(|(_, node)| node.key.clone())
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["capitulo-1".to_string()]);

    let extraction = extract(&lines, &skeleton);
    assert!(extraction.unmatched_headings.is_empty());
    assert_eq!(extraction.articles[0].division_key.as_deref(), Some("capitulo-1"));
}

#[test]
fn lines_before_the_first_article_are_kept_as_stray() {
    let lines = [
        "Texto preliminar sin artículo.",
        "Artículo 1o.- Texto del artículo.",
    ];
    let skeleton = build_skeleton("LEY", DocumentKind::Law, &stream(&lines), &patterns())
        .expect("skeleton should build");
    let extraction = extract(&lines, &skeleton);

    assert_eq!(
        extraction.stray_lines,
        vec!["page 1: Texto preliminar sin artículo.".to_string()]
    );
    assert_eq!(extraction.articles.len(), 1);
}

#[test]
fn identifiers_running_backwards_are_flagged() {
    let lines = [
        "Artículo 3o.- Tercero.",
        "Artículo 2o.- Segundo.",
        "Artículo 4o.- Cuarto.",
    ];
    let skeleton = build_skeleton("LEY", DocumentKind::Law, &stream(&lines), &patterns())
        .expect("skeleton should build");
    let extraction = extract(&lines, &skeleton);

    let flagged = extraction
        .articles
        .iter()
        .filter(|article| article.issues.iter().any(|issue| issue.kind == IssueKind::OutOfOrder))
        .map(|article| article.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(flagged, vec!["2o"]);
}
