//! Integration tests for the ingest → store → retrieve pipeline.
//!
//! Uses the deterministic `hash` embedder so no model download or network
//! access is needed.

use lopdf::{content::Content, content::Operation, Dictionary, Document, Object, Stream};
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

use shariah_audit::config::Config;
use shariah_audit::embedding::HashProvider;
use shariah_audit::ingest::{ingest_folder, ingest_pages, run_ingest};
use shariah_audit::models::SourcePage;
use shariah_audit::retrieve::retrieve;
use shariah_audit::store::VectorStore;

fn test_config(tmp: &TempDir) -> Config {
    let config_content = format!(
        r#"[documents]
folder = "{root}/pdfs"

[index]
dir = "{root}/index"

[chunking]
chunk_size = 300
chunk_overlap = 40

[embedding]
provider = "hash"
dims = 256
batch_size = 4
"#,
        root = tmp.path().display()
    );
    let config: Config = toml::from_str(&config_content).unwrap();
    fs::create_dir_all(&config.documents.folder).unwrap();
    config
}

/// A one-page PDF per entry of `lines`, built with lopdf.
fn pdf_with_pages(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let resources_id = doc.add_object(Dictionary::from_iter(vec![(
        "Font",
        Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
    )]));

    let mut page_ids = Vec::new();
    for line in lines {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        line.as_bytes().to_vec(),
                        lopdf::StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            ),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Reference(resources_id)),
        ]));
        page_ids.push(page_id);
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

fn page(source: &str, page: u32, text: &str) -> SourcePage {
    SourcePage {
        source: source.to_string(),
        page,
        text: text.to_string(),
    }
}

fn reference_pages() -> Vec<SourcePage> {
    vec![
        page(
            "aaoifi_standard_8.pdf",
            1,
            &"Murabaha requires the institution to own the asset before selling it. ".repeat(12),
        ),
        page(
            "aaoifi_standard_8.pdf",
            2,
            "A late payment penalty may not become income of the institution; it is given to charity.",
        ),
        page(
            "fatwa_collection.pdf",
            1,
            &"Any stipulated increase over a loan principal is riba and is prohibited. ".repeat(10),
        ),
        page(
            "fatwa_collection.pdf",
            3,
            "Sale contracts with excessive uncertainty about the subject matter are void due to gharar.",
        ),
    ]
}

#[tokio::test]
async fn test_empty_folder_yields_empty_index() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let embedder = HashProvider::new(256);

    let stats = run_ingest(&cfg, &embedder).await.unwrap();
    assert_eq!(stats.files_found, 0);
    assert_eq!(stats.chunks, 0);

    let store = VectorStore::open(&cfg).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    let hits = retrieve(&store, &embedder, "riba", 3).await.unwrap();
    assert!(hits.is_empty(), "empty index must return no context");
}

#[tokio::test]
async fn test_reingest_yields_identical_index() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let store = VectorStore::open(&cfg).await.unwrap();
    let embedder = HashProvider::new(256);
    let pages = reference_pages();

    ingest_pages(&cfg, &store, &embedder, &pages).await.unwrap();
    let first_count = store.count().await.unwrap();
    let first_hits = retrieve(&store, &embedder, "late payment penalty", 3)
        .await
        .unwrap();

    ingest_pages(&cfg, &store, &embedder, &pages).await.unwrap();
    let second_hits = retrieve(&store, &embedder, "late payment penalty", 3)
        .await
        .unwrap();

    assert!(first_count > 0);
    assert_eq!(store.count().await.unwrap(), first_count);
    let ids = |hits: &[shariah_audit::models::RetrievedChunk]| {
        hits.iter().map(|h| h.chunk_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first_hits[..]), ids(&second_hits[..]));
}

#[tokio::test]
async fn test_k_limits_results_to_indexed_documents() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let store = VectorStore::open(&cfg).await.unwrap();
    let embedder = HashProvider::new(256);

    // An earlier build from a different folder must not leak into results.
    ingest_pages(
        &cfg,
        &store,
        &embedder,
        &[page("retired_guideline.pdf", 1, "Riba and late payment penalty rules.")],
    )
    .await
    .unwrap();

    let pages = reference_pages();
    let stats = ingest_pages(&cfg, &store, &embedder, &pages).await.unwrap();
    assert!(stats.chunks > 3);

    let indexed: HashSet<&str> = pages.iter().map(|p| p.source.as_str()).collect();
    for query in ["riba on loans", "late payment penalty", "gharar uncertainty", "murabaha"] {
        let hits = retrieve(&store, &embedder, query, 3).await.unwrap();
        assert!(hits.len() <= 3);
        assert!(!hits.is_empty());
        for hit in &hits {
            assert!(
                indexed.contains(hit.source.as_str()),
                "unexpected source {}",
                hit.source
            );
        }
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

#[tokio::test]
async fn test_relevant_chunk_ranks_first() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let store = VectorStore::open(&cfg).await.unwrap();
    let embedder = HashProvider::new(512);
    ingest_pages(&cfg, &store, &embedder, &reference_pages())
        .await
        .unwrap();

    let hits = retrieve(
        &store,
        &embedder,
        "contracts with excessive uncertainty about the subject matter",
        1,
    )
    .await
    .unwrap();
    assert_eq!(hits[0].source, "fatwa_collection.pdf");
    assert_eq!(hits[0].page, 3);
}

#[tokio::test]
async fn test_corrupt_pdf_skipped_and_valid_pdf_loaded() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    fs::write(cfg.documents.folder.join("broken.pdf"), b"%PDF-1.4 truncated").unwrap();
    fs::write(
        cfg.documents.folder.join("Standard.PDF"),
        pdf_with_pages(&["Riba is prohibited in all loans.", "Gharar must be avoided."]),
    )
    .unwrap();
    fs::write(cfg.documents.folder.join("readme.txt"), "not a pdf").unwrap();

    let store = VectorStore::open(&cfg).await.unwrap();
    let stats = ingest_folder(&cfg, &store, &HashProvider::new(256))
        .await
        .unwrap();

    assert_eq!(stats.files_found, 2);
    assert_eq!(stats.files_loaded, 1);
    assert_eq!(stats.files_skipped, 1);
    assert_eq!(store.count().await.unwrap(), stats.chunks as i64);
    for source in store.sources().await.unwrap() {
        assert_eq!(source.source, "Standard.PDF");
    }
}
