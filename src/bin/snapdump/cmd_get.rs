use anyhow::{Context, Result};

use snapdump::catalog;
use snapdump::item::b64_display;
use snapdump::snapshot::SnapshotManager;
use snapdump::{Source, SourceLocation};

use super::util::{decode_key_arg, display_text, hex_dump};

pub fn exec(source: String, key: String) -> Result<()> {
    let key_bytes = decode_key_arg(&key)?;
    let location = SourceLocation::parse(&source)?;
    let src = Source::connect(&location).with_context(|| format!("connect {}", source))?;

    let mut snap = SnapshotManager::open(&src)?;
    let found = snap.snapshot().and_then(|s| src.get(s, &key_bytes));
    snap.release()?;

    match found? {
        Some(v) => {
            let cat = catalog::of_key(&key_bytes).map(|c| c.name).unwrap_or("-");
            println!("FOUND {} [{}]: {} B", b64_display(&key_bytes), cat, v.len());
            println!("text: {}", display_text(&v));
            println!("hex:  {}", hex_dump(&v[..v.len().min(64)]));
        }
        None => println!("NOT FOUND {}", b64_display(&key_bytes)),
    }
    Ok(())
}
