//! `deltawatch inspect`: summarize a built module image.

use std::path::Path;

use anyhow::{Context, Result};

use crate::image::ModuleImage;
use crate::log;

pub fn run_inspect(path: &Path) -> Result<()> {
    let image =
        ModuleImage::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    for line in summary(&image) {
        log!("inspect"; "{}", line);
    }
    Ok(())
}

fn summary(image: &ModuleImage) -> [String; 3] {
    [
        format!("module id: {}", image.module_id),
        format!("code: {} bytes", image.code.len()),
        format!("types: {}", image.type_tokens.len()),
    ]
}
