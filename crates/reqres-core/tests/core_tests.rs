use std::fs;
use tempfile::TempDir;

use reqres_core::config::ChunkingConfig;
use reqres_core::loader::{load_directory, load_document};
use reqres_core::segment::Segmenter;
use reqres_core::types::DocumentFormat;
use reqres_core::Error;

#[test]
fn load_directory_isolates_unsupported_files() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("b_guidelines.md"), "Prefer measurable terms.").unwrap();
    fs::write(dir.join("a_scan.pdf"), [0x25, 0x50, 0x44, 0x46]).unwrap();
    fs::create_dir(dir.join("nested")).unwrap();
    fs::write(dir.join("nested").join("glossary.json"), r#"[{"term": "latency", "definition": "Time to first byte."}]"#).unwrap();

    let docs = load_directory(dir).expect("load");
    assert_eq!(docs.len(), 3);
    assert!(matches!(&docs[0], Err(Error::Ingestion { source_name, .. }) if source_name == "a_scan.pdf"));
    let guidelines = docs[1].as_ref().expect("markdown");
    assert_eq!(guidelines.source, "b_guidelines.md");
    assert_eq!(guidelines.format, DocumentFormat::Custom);
    let glossary = docs[2].as_ref().expect("json");
    assert_eq!(glossary.format, DocumentFormat::Glossary);
    assert_eq!(glossary.sections[0].text, "latency: Time to first byte.");
}

#[test]
fn missing_directory_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let err = load_directory(&tmp.path().join("absent")).unwrap_err();
    assert!(matches!(err, Error::Ingestion { .. }));
}

#[test]
fn template_files_segment_per_template() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("requirement_templates.txt");
    fs::write(
        &path,
        "TEMPLATE: The <system> shall <action> within <time>.\nUse for timing.\n\nTEMPLATE: The <system> shall support <n> users.\n",
    )
    .unwrap();

    let doc = load_document(&path).expect("doc");
    assert_eq!(doc.format, DocumentFormat::Template);
    let chunks = Segmenter::new(ChunkingConfig::default()).segment(&doc);
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.text.starts_with("TEMPLATE:")));
    assert!(chunks[0].id.starts_with("requirement_templates.txt:0:"));
    assert!(chunks[1].id.starts_with("requirement_templates.txt:1:"));
}

#[test]
fn invalid_utf8_is_read_lossily() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("legacy.txt");
    fs::write(&path, [b'o', b'k', 0xff, b'!']).unwrap();
    let doc = load_document(&path).expect("doc");
    assert!(doc.sections[0].text.starts_with("ok"));
}

#[test]
fn same_file_name_in_different_folders_keeps_distinct_sources() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    for folder in ["iso", "team"] {
        fs::create_dir(dir.join(folder)).unwrap();
        fs::write(dir.join(folder).join("notes.txt"), format!("Notes kept by {folder}.")).unwrap();
    }

    let docs = load_directory(dir).expect("load");
    let sources: Vec<&str> = docs.iter().map(|d| d.as_ref().expect("doc").source.as_str()).collect();
    assert_eq!(sources, vec!["iso/notes.txt", "team/notes.txt"]);

    let chunks: Vec<String> = docs
        .iter()
        .flat_map(|d| Segmenter::new(ChunkingConfig::default()).segment(d.as_ref().expect("doc")))
        .map(|c| c.id)
        .collect();
    assert!(chunks[0].starts_with("iso/notes.txt:0:"));
    assert!(chunks[1].starts_with("team/notes.txt:0:"));
}

#[cfg(unix)]
#[test]
fn unreadable_entry_is_reported_against_its_own_path() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("good.txt"), "Prefer measurable terms.").unwrap();
    std::os::unix::fs::symlink(dir.join("missing.txt"), dir.join("dangling.txt")).unwrap();

    let docs = load_directory(dir).expect("load");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].as_ref().expect("good").source, "good.txt");
    assert!(matches!(&docs[1], Err(Error::Ingestion { source_name, .. }) if source_name == "dangling.txt"));
}
