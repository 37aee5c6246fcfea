use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use snapdump::catalog;
use snapdump::config::ExistingDest;
use snapdump::{run_import, ImportContext, Item, Store};

fn write_gz(path: &Path, lines: &[Vec<u8>]) -> Result<()> {
    let mut enc = GzEncoder::new(fs::File::create(path)?, Compression::fast());
    for l in lines {
        enc.write_all(l)?;
        enc.write_all(b"\n")?;
    }
    enc.finish()?;
    Ok(())
}

fn items(prefix: u8, n: u32) -> Vec<Item> {
    (0..n)
        .map(|i| Item::new([&[prefix][..], &i.to_be_bytes()[..]].concat(), format!("v{i}").into_bytes()))
        .collect()
}

fn lines(items: &[Item]) -> Result<Vec<Vec<u8>>> {
    Ok(items.iter().map(|it| it.to_json_line()).collect::<snapdump::Result<_>>()?)
}

fn import_ctx(dir: &Path, dest: &Path, mode: ExistingDest) -> ImportContext {
    ImportContext {
        archive_dir: dir.to_path_buf(),
        destination: dest.to_path_buf(),
        categories: None,
        existing_dest: mode,
        sync_on_close: false,
        cancel: CancellationToken::new(),
    }
}

#[test]
fn reimport_is_idempotent() -> Result<()> {
    let root = unique_root("idem");
    let dir = root.join("archive");
    let dst = root.join("dst");
    fs::create_dir_all(&dir)?;
    let hs = items(0x02, 300);
    write_gz(&dir.join("block-height.json.gz"), &lines(&hs)?)?;

    run_import(&import_ctx(&dir, &dst, ExistingDest::Refuse))?;
    let first = Store::open_ro(&dst)?.snapshot();

    let rep = run_import(&import_ctx(&dir, &dst, ExistingDest::Merge))?;
    assert_eq!(rep.total_items, 300);
    let st = Store::open_ro(&dst)?;
    assert_eq!(st.len(), first.len());
    for it in &hs {
        assert_eq!(st.get(&it.key).as_deref(), Some(it.value.as_slice()));
    }
    assert_eq!(first.range_page(b"\x02", None, 1000), st.snapshot().range_page(b"\x02", None, 1000));
    drop(st);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn plain_json_and_blank_lines_and_skipped_files() -> Result<()> {
    let root = unique_root("plain");
    let dir = root.join("archive");
    let dst = root.join("dst");
    fs::create_dir_all(dir.join("nested.json"))?;
    fs::write(dir.join("README.txt"), b"not an archive")?;

    let internal = items(0x50, 3);
    let mut body = Vec::new();
    for l in lines(&internal)? {
        body.extend_from_slice(&l);
        body.extend_from_slice(b"\r\n\n   \n");
    }
    fs::write(dir.join("internal.json"), &body)?;
    // нижний регистр полей тоже принимается
    fs::write(dir.join("block-hash.json"), b"{\"key\":\"AGE=\",\"value\":\"eA==\"}")?;

    let rep = run_import(&import_ctx(&dir, &dst, ExistingDest::Refuse))?;
    let names: Vec<&str> = rep.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["block-hash.json", "internal.json"]);
    assert_eq!(rep.total_items, 4);

    let st = Store::open_ro(&dst)?;
    assert_eq!(st.get(b"\x00a").as_deref(), Some(&b"x"[..]));
    assert_eq!(st.len(), 4);
    drop(st);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn category_filter_limits_files() -> Result<()> {
    let root = unique_root("filter");
    let dir = root.join("archive");
    let dst = root.join("dst");
    fs::create_dir_all(&dir)?;
    write_gz(&dir.join("block-height.json.gz"), &lines(&items(0x02, 10))?)?;
    write_gz(&dir.join("internal.json.gz"), &lines(&items(0x50, 5))?)?;

    let mut ctx = import_ctx(&dir, &dst, ExistingDest::Refuse);
    ctx.categories = Some(catalog::resolve_selection(&["internal"])?);
    let rep = run_import(&ctx)?;
    assert_eq!(rep.total_items, 5);
    assert_eq!(Store::open_ro(&dst)?.len(), 5);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn bad_line_reports_file_and_line() -> Result<()> {
    let root = unique_root("bad");
    let dir = root.join("archive");
    let dst = root.join("dst");
    fs::create_dir_all(&dir)?;
    let mut ls = lines(&items(0x02, 2))?;
    ls.push(b"{\"Key\": 12}".to_vec());
    write_gz(&dir.join("block-height.json.gz"), &ls)?;

    let err = run_import(&import_ctx(&dir, &dst, ExistingDest::Refuse)).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    let msg = err.to_string();
    assert!(msg.contains("block-height.json.gz:3"), "{msg}");
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn directory_without_archives_is_validation_error() -> Result<()> {
    let root = unique_root("noarch");
    let dir = root.join("archive");
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("notes.txt"), b"-")?;
    let err = run_import(&import_ctx(&dir, &root.join("dst"), ExistingDest::Refuse)).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(!root.join("dst").exists());
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn destination_overlapping_archives_is_rejected() -> Result<()> {
    let root = unique_root("overlap");
    let dir = root.join("archive");
    fs::create_dir_all(&dir)?;
    let archive = dir.join("internal.json.gz");
    write_gz(&archive, &lines(&items(0x50, 5))?)?;

    // родитель архивов с --force, сами архивы, поддиректория архивов
    for dest in [root.clone(), dir.clone(), dir.join("restored")] {
        let err = run_import(&import_ctx(&dir, &dest, ExistingDest::Wipe)).unwrap_err();
        assert_eq!(err.exit_code(), 2, "dest {}", dest.display());
        assert!(archive.exists(), "archive wiped via {}", dest.display());
    }
    assert!(!dir.join("restored").exists());
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("snapdump-{}-{}-{}", prefix, pid, t))
}
