use anyhow::Result;

use snapdump::catalog;

pub fn exec() -> Result<()> {
    print!("{}", catalog::render_listing());
    Ok(())
}
