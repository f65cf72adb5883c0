use std::fs;
use tempfile::TempDir;

use docrag_core::chunker::Chunker;
use docrag_core::config::Vocabulary;
use docrag_core::loader;
use docrag_core::types::{keys, Document, Metadata, QA_TYPE};
use docrag_core::MetadataExtractor;
use serde_json::Value;

const MANUAL: &str = "# RIO manual\n\n## Setup\nConnect the RIO to the network. Power it on. Wait for the LED.\n\n## Tally\n- Red means program.\n- Green means preview.\n\nThe RCP shows tally state too; it mirrors the RIO. Does it work over IP? Yes it does.\n\n## Troubleshooting\nIf nothing happens, check the cable: it must be Cat6.";

/// Rebuild the text from spans with overlaps removed; also checks the
/// overlap bound between neighbours.
fn reconstruct(text: &str, spans: &[std::ops::Range<usize>], overlap: usize) -> String {
    let mut out = String::new();
    let mut end = 0usize;
    for span in spans {
        assert!(span.start <= end, "gap before {span:?}");
        let shared = text[span.start..end.max(span.start)].chars().count();
        assert!(shared <= overlap, "overlap {shared} exceeds {overlap}");
        if span.end > end {
            out.push_str(&text[end.max(span.start)..span.end]);
            end = span.end;
        }
    }
    out
}

#[test]
fn chunks_cover_text_and_respect_bounds() {
    for (size, overlap) in [(40, 10), (25, 0), (80, 30), (7, 3)] {
        let chunker = Chunker::new(size, overlap).expect("chunker");
        let spans = chunker.split_text(MANUAL);
        assert!(!spans.is_empty());
        for s in &spans {
            let len = MANUAL[s.clone()].chars().count();
            assert!(len <= size, "chunk of {len} chars > {size}");
            assert!(len > 0);
        }
        assert_eq!(reconstruct(MANUAL, &spans, overlap), MANUAL);
    }
}

#[test]
fn neighbouring_chunks_share_overlap_text() {
    let prose = "the rcp and the rio and the vp4 all share one tally bus so set it up once and it just works";
    for (size, overlap) in [(20, 8), (30, 10)] {
        let spans = Chunker::new(size, overlap).expect("chunker").split_text(prose);
        assert!(spans.len() > 2);
        for pair in spans.windows(2) {
            let shared = pair[0].end.saturating_sub(pair[1].start);
            assert!(shared > 0, "{:?} and {:?} share nothing", &prose[pair[0].clone()], &prose[pair[1].clone()]);
            assert!(shared <= overlap);
        }
        assert_eq!(reconstruct(prose, &spans, overlap), prose);
    }
    assert_eq!(Chunker::new(20, 8).unwrap().split_text(prose)[1], 11..31);
}

#[test]
fn prefers_heading_boundaries() {
    let chunker = Chunker::new(120, 0).expect("chunker");
    let doc = Document::new(MANUAL);
    let chunks = chunker.split(&doc);
    assert!(chunks.iter().skip(1).any(|c| c.text.starts_with("\n## Tally")));
}

#[test]
fn chunk_positions_and_metadata_are_inherited() {
    let mut meta = Metadata::new();
    meta.insert(keys::SOURCE.into(), Value::from("manual.md"));
    let doc = Document::with_metadata(MANUAL, meta);
    let chunks = Chunker::new(50, 10).expect("chunker").split(&doc);
    let total = chunks.len();
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.chunk_index, i);
        assert_eq!(c.chunk_total, total);
        assert!(c.chunk_index < c.chunk_total);
        assert_eq!(c.metadata[keys::SOURCE], Value::from("manual.md"));
        assert_eq!(c.text, &MANUAL[c.span.clone()]);
    }
}

#[test]
fn split_is_deterministic() {
    let chunker = Chunker::new(30, 5).expect("chunker");
    assert_eq!(chunker.split_text(MANUAL), chunker.split_text(MANUAL));
}

#[test]
fn qa_question_chunk_gets_answer_excerpt() {
    let mut meta = Metadata::new();
    meta.insert(keys::TYPE.into(), Value::from(QA_TYPE));
    let doc = Document::with_metadata("Q: What is X?\nA: X is a widget.", meta);
    let chunks = Chunker::new(15, 0).expect("chunker").split(&doc);

    assert_eq!(chunks[0].text, "Q: What is X?\nA: X is a widget....");
    assert_eq!(chunks[0].span, 0..13);
    // later chunks are untouched slices
    for c in &chunks[1..] {
        assert_eq!(c.text, &doc.text[c.span.clone()]);
    }
}

#[test]
fn non_qa_documents_are_not_repaired() {
    let doc = Document::new("Q: What is X?\nA: X is a widget.");
    let chunks = Chunker::new(15, 0).expect("chunker").split(&doc);
    assert_eq!(chunks[0].text, "Q: What is X?");
}

#[test]
fn extractor_is_deterministic_and_configurable() {
    let vocab = Vocabulary { products: vec!["Widget".into()], topics: vec!["Setup".into()] };
    let ex = MetadataExtractor::new(&vocab).expect("extractor");
    let a = ex.extract("Widget Setup. Widget again.");
    let b = ex.extract("Widget Setup. Widget again.");
    assert_eq!(a, b);
    assert_eq!(a[keys::PRODUCT], Value::from("Widget"));
    assert_eq!(a[keys::TOPIC], Value::from("Setup"));

    let default = MetadataExtractor::new(&Vocabulary::default()).expect("extractor");
    let meta = default.extract(MANUAL);
    assert_eq!(meta[keys::PRODUCT], Value::from("RIO"));
    assert_eq!(meta[keys::TYPE], Value::from(QA_TYPE));
}

#[test]
fn load_directory_mixes_text_and_faq_and_skips_bad_files() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::create_dir(dir.join("docs")).unwrap();
    fs::write(dir.join("docs/b.md"), "# Heading\ncharlie").unwrap();
    fs::write(
        dir.join("faq.json"),
        r#"{"faq": [{"question": "What is the RCP?", "answer": "A panel."}, {"question": "And RIO?", "answer": "A box."}]}"#,
    )
    .unwrap();
    fs::write(dir.join("broken.json"), "{ not json").unwrap();
    fs::write(dir.join("image.png"), [0u8, 1, 2]).unwrap();

    let docs = loader::load_directory(dir);
    assert_eq!(docs.len(), 4);

    let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
    assert!(texts.contains(&"alpha bravo"));
    assert!(texts.contains(&"Q: And RIO?\nA: A box."));
    assert!(docs.iter().all(|d| d.source().is_some()));
    assert_eq!(docs.iter().filter(|d| d.is_qa()).count(), 2);
}

#[test]
fn missing_directory_loads_nothing() {
    let tmp = TempDir::new().unwrap();
    assert!(loader::load_directory(&tmp.path().join("absent")).is_empty());
}
