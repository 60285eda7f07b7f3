mod common;

use fwlocate::config::{SpecialAction, SpecialTargetConfig};
use fwlocate::pipeline::RunVerdict;

use common::{catalog_of, embed, job, plain_config, pseudo_random, run, write_file};

#[test]
fn walk_stops_once_every_block_is_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("tree");
    let block = pseudo_random(300, 1);
    write_file(&root, "a.dll", &embed(&block, 20, 20, 2));
    write_file(&root, "b.dll", &pseudo_random(10_000, 3));
    write_file(&root, "sub/c.dll", &pseudo_random(10_000, 4));

    let job = job(catalog_of(&[("fw.bin", &block[..])]), &plain_config());
    let (report, lines) = run(&job, &root, &temp.path().join("out"));

    assert_eq!(report.verdict, RunVerdict::Complete);
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.bytes_scanned, 340);
    assert_eq!(lines.last().map(String::as_str), Some("Extraction done!"));
}

#[test]
fn scan_stops_mid_file_once_satisfied() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("tree");
    let block = pseudo_random(1000, 5);
    write_file(&root, "big.exe", &embed(&block, 0, 1024 * 1024, 6));

    let mut cfg = plain_config();
    cfg.read_buffer_kib = 4;
    let job = job(catalog_of(&[("fw.bin", &block[..])]), &cfg);
    let (report, _) = run(&job, &root, &temp.path().join("out"));

    assert_eq!(report.verdict, RunVerdict::Complete);
    assert_eq!(report.bytes_scanned, 4096);
}

#[test]
fn missing_special_target_keeps_the_walk_going() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("tree");
    let block = pseudo_random(100, 7);
    write_file(&root, "a.dll", &block);
    write_file(&root, "b.dll", &pseudo_random(500, 8));
    write_file(&root, "z/TIRViews.dll", b"views");

    let mut cfg = plain_config();
    cfg.special_targets.push(SpecialTargetConfig {
        name: "TIRViews.dll".to_string(),
        action: SpecialAction::Copy,
        output: None,
        label: None,
    });
    let job = job(catalog_of(&[("fw.bin", &block[..])]), &cfg);
    let (report, _) = run(&job, &root, &temp.path().join("out"));

    assert_eq!(report.verdict, RunVerdict::Complete);
    // b.dll is still scanned: the special target was outstanding.
    assert_eq!(report.files_scanned, 2);
    assert!(report.destination.join("TIRViews.dll").exists());
}

#[test]
fn found_blocks_are_not_extracted_twice() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("tree");
    let block = pseudo_random(64, 9);
    write_file(&root, "a.dll", &embed(&block, 5, 5, 10));
    write_file(&root, "b.dll", &embed(&block, 7, 7, 11));

    let job = job(
        catalog_of(&[("fw.bin", &block[..]), ("other.bin", &b"absent data"[..])]),
        &plain_config(),
    );
    let (report, lines) = run(&job, &root, &temp.path().join("out"));

    assert_eq!(report.verdict, RunVerdict::Incomplete);
    assert_eq!(report.blocks_extracted, 1);
    assert_eq!(report.files_scanned, 2);
    assert_eq!(lines.iter().filter(|l| *l == "Extracted fw.bin...").count(), 1);
}
