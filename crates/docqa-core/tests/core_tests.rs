use std::fs;

use figment::providers::{Format, Toml};
use figment::Figment;
use tempfile::TempDir;

use docqa_core::chunker::{reassemble, Chunker, ChunkingConfig, DocumentText};
use docqa_core::config::{Config, EmptyPolicy, FusionKind, Settings};
use docqa_core::conversation::{parse_history, trim_history, Query, Turn};
use docqa_core::loader::{collect_text_files, load_pages, split_pages};
use docqa_core::types::{Document, Page};
use docqa_core::Error;

fn chunker(size: usize, overlap: usize) -> Chunker {
    Chunker::new(ChunkingConfig { chunk_size: size, chunk_overlap: overlap }).expect("chunker")
}

fn sample_text() -> String {
    (0..60)
        .map(|i| {
            format!("Sentence number {i} talks about rainwater cisterns and gravity fed plumbing.")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn short_document_yields_one_chunk() {
    let doc = Document::new("notes.pdf");
    let chunks = chunker(1024, 200).chunk_text(&doc, "Short text").expect("chunk");
    assert_eq!(chunks.len(), 1, "one small document becomes one chunk");
    assert_eq!(chunks[0].text, "Short text");
    assert_eq!(chunks[0].page, 1);
    assert_eq!(chunks[0].start, 0);
    assert_eq!(chunks[0].end, 10);
}

#[test]
fn chunks_reassemble_to_original_text() {
    let doc = Document::new("manual.pdf");
    let text = sample_text();
    for (size, overlap) in [(120, 30), (200, 0), (97, 50), (1024, 200)] {
        let chunks = chunker(size, overlap).chunk_text(&doc, &text).expect("chunk");
        assert_eq!(reassemble(&chunks), text, "size={size} overlap={overlap}");
        for c in &chunks {
            assert!(c.text.chars().count() <= size, "chunk longer than configured maximum");
        }
    }
}

#[test]
fn consecutive_chunks_overlap_by_configured_amount() {
    let doc = Document::new("manual.pdf");
    let chunks = chunker(150, 40).chunk_text(&doc, &sample_text()).expect("chunk");
    assert!(chunks.len() > 3);
    for pair in chunks.windows(2) {
        assert_eq!(pair[0].end - pair[1].start, 40);
        let tail: String = pair[0].text.chars().skip(pair[0].text.chars().count() - 40).collect();
        let head: String = pair[1].text.chars().take(40).collect();
        assert_eq!(tail, head);
    }
}

#[test]
fn chunk_ids_are_unique_and_ordered() {
    let doc = Document::new("manual.pdf");
    let chunks = chunker(100, 20).chunk_text(&doc, &sample_text()).expect("chunk");
    let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    let sorted = ids.clone();
    ids.sort();
    ids.dedup();
    assert_eq!(ids, sorted, "ids unique and sort in ordinal order");
    assert!(chunks.iter().enumerate().all(|(i, c)| c.ordinal == i && c.doc_id == doc.id));
}

#[test]
fn empty_or_whitespace_document_is_rejected() {
    let doc = Document::new("blank.pdf");
    for text in ["", "   \n\t  "] {
        match chunker(100, 10).chunk_text(&doc, text) {
            Err(Error::EmptyDocument(source)) => assert_eq!(source, "blank.pdf"),
            other => panic!("expected EmptyDocument, got {other:?}"),
        }
    }
    let pages = vec![Page::new(1, " "), Page::new(2, "\n")];
    assert!(matches!(chunker(100, 10).chunk(&doc, &pages), Err(Error::EmptyDocument(_))));
}

#[test]
fn chunks_carry_page_numbers() {
    let doc = Document::new("two-pages.pdf");
    let pages = vec![Page::new(1, "alpha ".repeat(30)), Page::new(2, "bravo ".repeat(30))];
    let chunks = chunker(60, 10).chunk(&doc, &pages).expect("chunk");
    assert_eq!(chunks.first().map(|c| c.page), Some(1));
    assert_eq!(chunks.last().map(|c| c.page_end), Some(2));
    assert!(
        chunks.iter().any(|c| c.page == 1 && c.page_end == 2),
        "one chunk spans the page break"
    );
    assert_eq!(reassemble(&chunks), DocumentText::from_pages(&pages).text);
}

#[test]
fn invalid_chunking_config_is_rejected() {
    for (chunk_size, chunk_overlap) in [(10, 10), (0, 0)] {
        let cfg = ChunkingConfig { chunk_size, chunk_overlap };
        assert!(matches!(Chunker::new(cfg), Err(Error::InvalidConfig(_))));
    }
}

#[test]
fn reingestion_gets_a_new_document_id() {
    let t0 = chrono::Utc::now();
    let t1 = t0 + chrono::Duration::seconds(1);
    let a = Document::with_timestamp("docs/handbook v2.pdf", t0);
    let b = Document::with_timestamp("docs/handbook v2.pdf", t1);
    assert_ne!(a.id, b.id);
    assert!(a.id.starts_with("handbook_v2-"), "id = {}", a.id);
}

#[test]
fn form_feeds_split_pages() {
    let pages = split_pages("first page\x0csecond page\x0c");
    assert_eq!(pages, vec![Page::new(1, "first page"), Page::new(2, "second page")]);
    assert_eq!(split_pages("no breaks").len(), 1);
}

#[test]
fn loader_reads_nested_text_files() {
    let tmp = TempDir::new().unwrap();
    let nested = tmp.path().join("sub");
    fs::create_dir_all(&nested).unwrap();
    fs::write(tmp.path().join("b.txt"), "bravo\x0ccharlie").unwrap();
    fs::write(nested.join("a.txt"), "alpha").unwrap();
    fs::write(tmp.path().join("skip.pdf"), "binary").unwrap();

    let files = collect_text_files(&[tmp.path().to_path_buf()]);
    assert_eq!(files.len(), 2);
    let pages = load_pages(&tmp.path().join("b.txt")).expect("pages");
    assert_eq!(pages.len(), 2);
    assert!(matches!(load_pages(&tmp.path().join("missing.txt")), Err(Error::Io { .. })));
}

#[test]
fn settings_defaults_and_overrides() {
    let defaults = Settings::default();
    assert_eq!(defaults.chunking.chunk_size, 1024);
    assert_eq!(defaults.chunking.chunk_overlap, 200);
    assert!((defaults.bm25.k1 - 1.5).abs() < f32::EPSILON);
    assert!((defaults.bm25.b - 0.75).abs() < f32::EPSILON);
    assert!((defaults.retrieval.alpha - 0.75).abs() < f32::EPSILON);

    let config = Config::from_figment(Figment::new().merge(Toml::string(
        r#"
        [retrieval]
        alpha = 0.5
        fusion = "rrf"
        on_empty = "generate"

        [bm25]
        k1 = 1.2
        "#,
    )));
    let settings = config.settings().expect("settings");
    assert!((settings.retrieval.alpha - 0.5).abs() < f32::EPSILON);
    assert_eq!(settings.retrieval.fusion, FusionKind::Rrf);
    assert_eq!(settings.retrieval.on_empty, EmptyPolicy::Generate);
    assert!((settings.bm25.k1 - 1.2).abs() < f32::EPSILON);
    assert!((settings.bm25.b - 0.75).abs() < f32::EPSILON, "unset keys keep defaults");
    assert_eq!(config.get::<usize>("retrieval.top_n").ok(), None, "get only sees explicit keys");
}

#[test]
fn settings_validation_rejects_out_of_range_values() {
    let toml = Toml::string("[retrieval]\nalpha = 1.5\n");
    let config = Config::from_figment(Figment::new().merge(toml));
    assert!(config.settings().is_err());

    let mut settings = Settings::default();
    settings.retrieval.top_k = settings.retrieval.top_n + 1;
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));

    let mut settings = Settings::default();
    settings.store.timeout_ms = 0;
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(msg)) if msg.contains("store")));
}

#[test]
fn history_is_a_tagged_union() {
    let turns =
        parse_history(r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#)
            .expect("history");
    assert_eq!(turns, vec![Turn::User("hi".to_string()), Turn::Assistant("hello".to_string())]);
    assert_eq!(serde_json::to_string(&turns[0]).unwrap(), r#"{"role":"user","content":"hi"}"#);

    for bad in [
        r#"[{"role":"system","content":"x"}]"#,
        r#"[{"role":"user","content":"  "}]"#,
        r#"{"role":"user"}"#,
    ] {
        assert!(matches!(parse_history(bad), Err(Error::InvalidMessage(_))), "{bad}");
    }

    assert!(Query::new("  ").validate().is_err());
    assert!(Query::new("what size pump?").with_history(turns.clone()).validate().is_ok());
    assert_eq!(trim_history(&turns, 1), &turns[1..]);
    assert_eq!(trim_history(&turns, 10).len(), 2);
}
