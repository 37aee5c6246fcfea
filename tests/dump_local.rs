use anyhow::Result;
use flate2::read::GzDecoder;
use oorandom::Rand64;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use snapdump::catalog;
use snapdump::config::{DumpConfig, ExistingDest, OutputFormat};
use snapdump::store::DATA_LOG;
use snapdump::{run_dump, run_import, ImportContext, Item, RunContext, SourceLocation, Store};

type Kv = BTreeMap<Vec<u8>, Vec<u8>>;

/// Стор с высотами 1..=heights (block-height) и немного ключей других категорий.
fn seed_store(root: &Path, heights: u64, seed: u64) -> Result<Kv> {
    let mut rng = Rand64::new(seed as u128);
    let mut kv = Kv::new();
    for h in 1..=heights {
        let mut k = vec![0x02u8];
        k.extend_from_slice(&h.to_be_bytes());
        kv.insert(k, random_value(&mut rng));
    }
    for i in 0u32..50 {
        let mut k = vec![0x00u8];
        k.extend_from_slice(format!("hash-{i:04}").as_bytes());
        kv.insert(k, random_value(&mut rng));
        let mut k = vec![0x50u8];
        k.extend_from_slice(format!("internal-{i}").as_bytes());
        kv.insert(k, random_value(&mut rng));
    }

    let mut st = Store::open(root)?;
    for (k, v) in &kv {
        st.put(k, v)?;
    }
    st.close()?;
    Ok(kv)
}

fn random_value(rng: &mut Rand64) -> Vec<u8> {
    let len = 1 + rng.rand_range(0..64) as usize;
    (0..len).map(|_| rng.rand_u64() as u8).collect()
}

fn read_store(root: &Path) -> Result<Kv> {
    let st = Store::open_ro(root)?;
    let snap = st.snapshot();
    let mut out = Kv::new();
    for c in catalog::all() {
        for it in snap.range_page(c.prefix, None, usize::MAX) {
            out.insert(it.key, it.value);
        }
    }
    Ok(out)
}

fn read_archive(path: &Path) -> Result<Vec<Item>> {
    let r = BufReader::new(GzDecoder::new(fs::File::open(path)?));
    let mut out = Vec::new();
    for line in r.lines() {
        out.push(Item::from_json_line(line?.as_bytes())?);
    }
    Ok(out)
}

fn ctx(source: &Path, dest: &Path, names: &[&str], format: OutputFormat, mode: ExistingDest) -> Result<RunContext> {
    Ok(RunContext {
        config: DumpConfig::default()
            .with_output_format(format)
            .with_existing_dest(mode)
            .with_sync_on_close(false),
        categories: catalog::resolve_selection(names)?,
        source: SourceLocation::Local(source.to_path_buf()),
        destination: Some(dest.to_path_buf()),
        cancel: CancellationToken::new(),
    })
}

#[test]
fn block_height_to_archive_and_back() -> Result<()> {
    let root = unique_root("bh");
    let src = root.join("src");
    let archive = root.join("archive");
    let restored = root.join("restored");
    let kv = seed_store(&src, 2500, 7)?;

    let report = run_dump(&ctx(&src, &archive, &["block-height"], OutputFormat::GzipJson, ExistingDest::Refuse)?)?;
    let bh = report.category("block-height").expect("report");
    assert_eq!(bh.items, 2500);
    assert_eq!(bh.fetches, 3);

    let items = read_archive(&archive.join("block-height.json.gz"))?;
    assert_eq!(items.len(), 2500);
    assert!(items.windows(2).all(|w| w[0].key < w[1].key));
    let names: Vec<_> = fs::read_dir(&archive)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;
    assert_eq!(names, vec!["block-height.json.gz".to_string()]);

    let rep = run_import(&ImportContext {
        archive_dir: archive.clone(),
        destination: restored.clone(),
        categories: None,
        existing_dest: ExistingDest::Refuse,
        sync_on_close: false,
        cancel: CancellationToken::new(),
    })?;
    assert_eq!(rep.total_items, 2500);

    let got = read_store(&restored)?;
    let want: Kv = kv.into_iter().filter(|(k, _)| k[0] == 0x02).collect();
    assert_eq!(got, want);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn full_dump_into_store_is_byte_identical() -> Result<()> {
    let root = unique_root("full");
    let src = root.join("src");
    let dst = root.join("dst");
    let kv = seed_store(&src, 321, 11)?;

    let mut c = ctx(&src, &dst, &[], OutputFormat::Store, ExistingDest::Refuse)?;
    c.config = c.config.with_page_limit(17);
    let report = run_dump(&c)?;
    assert_eq!(report.categories.len(), catalog::all().len());
    assert_eq!(report.total_items, kv.len() as u64);
    // пустая категория: ровно одна пустая страница
    assert_eq!(report.category("internal").map(|c| c.items), Some(50));
    assert_eq!(report.category("transaction-pool").map(|c| c.fetches), Some(1));

    assert_eq!(read_store(&dst)?, kv);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn empty_category_writes_no_archive() -> Result<()> {
    let root = unique_root("empty");
    let src = root.join("src");
    let out = root.join("out");
    seed_store(&src, 10, 3)?;

    run_dump(&ctx(&src, &out, &["transaction-pool", "internal"], OutputFormat::GzipJson, ExistingDest::Refuse)?)?;
    assert!(!out.join("transaction-pool.json.gz").exists());
    assert_eq!(read_archive(&out.join("internal.json.gz"))?.len(), 50);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn non_empty_destination_needs_force_or_merge() -> Result<()> {
    let root = unique_root("dest");
    let src = root.join("src");
    let out = root.join("out");
    seed_store(&src, 20, 5)?;
    fs::create_dir_all(&out)?;
    fs::write(out.join("notes.txt"), b"keep me")?;

    let err = run_dump(&ctx(&src, &out, &["block-height"], OutputFormat::GzipJson, ExistingDest::Refuse)?)
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(out.join("notes.txt").exists());

    // merge: чужие файлы и другие категории на месте
    fs::write(out.join("block-hash.json.gz"), b"stale but untouched")?;
    run_dump(&ctx(&src, &out, &["block-height"], OutputFormat::GzipJson, ExistingDest::Merge)?)?;
    assert!(out.join("notes.txt").exists());
    assert_eq!(fs::read(out.join("block-hash.json.gz"))?, b"stale but untouched");
    assert_eq!(read_archive(&out.join("block-height.json.gz"))?.len(), 20);

    // force: всё удалено, остаются только выбранные категории
    run_dump(&ctx(&src, &out, &["internal"], OutputFormat::GzipJson, ExistingDest::Wipe)?)?;
    assert!(!out.join("notes.txt").exists());
    assert!(!out.join("block-height.json.gz").exists());
    assert!(out.join("internal.json.gz").exists());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn merge_into_store_keeps_other_prefixes() -> Result<()> {
    let root = unique_root("merge");
    let src = root.join("src");
    let dst = root.join("dst");
    let kv = seed_store(&src, 40, 9)?;
    {
        let mut st = Store::open(&dst)?;
        st.put(b"\x40pool-entry", b"local only")?;
        st.close()?;
    }

    run_dump(&ctx(&src, &dst, &["block-height"], OutputFormat::Store, ExistingDest::Merge)?)?;
    let got = read_store(&dst)?;
    assert_eq!(got.get(&b"\x40pool-entry"[..]).map(|v| v.as_slice()), Some(&b"local only"[..]));
    assert_eq!(got.len(), 41);
    assert!(kv.iter().filter(|(k, _)| k[0] == 0x02).all(|(k, v)| got.get(k) == Some(v)));
    assert!(got.keys().all(|k| k[0] == 0x02 || k[0] == 0x40));
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn unknown_category_lists_all_unknown_names() {
    let err = catalog::resolve_selection(&["block-height", "blocks", "nope"]).unwrap_err();
    let msg = err.to_string();
    assert_eq!(err.exit_code(), 2);
    assert!(msg.contains("blocks") && msg.contains("nope"), "{msg}");
}

#[test]
fn destination_equal_to_source_is_rejected() -> Result<()> {
    let root = unique_root("self");
    let src = root.join("src");
    seed_store(&src, 3, 1)?;
    let err = run_dump(&ctx(&src, &src, &["block-height"], OutputFormat::Store, ExistingDest::Wipe)?).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    // источник не пострадал
    assert_eq!(Store::open_ro(&src)?.len(), 103);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn destination_containing_source_is_rejected() -> Result<()> {
    let root = unique_root("parent");
    let src = root.join("src");
    seed_store(&src, 3, 1)?;
    fs::write(root.join("notes.txt"), b"non-empty parent")?;

    let err = run_dump(&ctx(&src, &root, &["block-height"], OutputFormat::GzipJson, ExistingDest::Wipe)?).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(src.join(DATA_LOG).exists(), "--force must not delete the source");
    assert!(root.join("notes.txt").exists());
    assert_eq!(Store::open_ro(&src)?.len(), 103);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn destination_inside_source_is_rejected() -> Result<()> {
    let root = unique_root("child");
    let src = root.join("src");
    seed_store(&src, 3, 1)?;
    let inner = src.join("out");

    let err = run_dump(&ctx(&src, &inner, &["block-height"], OutputFormat::Store, ExistingDest::Refuse)?).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(!inner.exists());
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn dry_run_writes_nothing() -> Result<()> {
    let root = unique_root("dry");
    let src = root.join("src");
    seed_store(&src, 30, 2)?;
    let mut c = ctx(&src, &root.join("never"), &["block-height"], OutputFormat::GzipJson, ExistingDest::Refuse)?;
    c.config = c.config.with_dry_run(true);
    c.destination = None;
    let report = run_dump(&c)?;
    assert_eq!(report.total_items, 30);
    assert!(!root.join("never").exists());
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn missing_or_empty_source_is_validation_error() -> Result<()> {
    let root = unique_root("nosrc");
    let out = root.join("out");
    let err = run_dump(&ctx(&root.join("absent"), &out, &[], OutputFormat::Store, ExistingDest::Refuse)?).unwrap_err();
    assert_eq!(err.exit_code(), 2);

    fs::create_dir_all(root.join("empty"))?;
    let err = run_dump(&ctx(&root.join("empty"), &out, &[], OutputFormat::Store, ExistingDest::Refuse)?).unwrap_err();
    assert_eq!(err.exit_code(), 2);
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
