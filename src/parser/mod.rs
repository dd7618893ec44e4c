pub mod fields;
pub mod toc;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::config::Layout;
use crate::pdf::PageSource;
use fields::{InstructionSpec, SpecBuilder};
use toc::StructureError;

/// Two-stage pipeline: TOC page → instruction page range → records.
pub fn extract(doc: &impl PageSource, layout: &Layout, pb: &ProgressBar) -> Result<Vec<InstructionSpec>> {
    let count = doc.page_count();
    if layout.toc_page >= count {
        return Err(StructureError::TocPageMissing {
            index: layout.toc_page,
            count,
        }
        .into());
    }

    let toc = doc.page(layout.toc_page)?;
    let range = toc::locate(&toc.text(), &layout.heading_marker, layout.page_offset)?;
    let end = range.end.min(count);
    if range.start >= end {
        warn!(start = range.start, end = range.end, pages = count, "Instruction range is empty");
    }
    info!("Instruction section: pages {}..{} of {}", range.start, end, count);

    pb.set_length(end.saturating_sub(range.start) as u64);
    let mut builder = SpecBuilder::new(&layout.fonts);
    let mut skipped_runs = 0;
    for index in range.start..end {
        let page = doc.page(index).with_context(|| format!("Failed to load page {}", index))?;
        skipped_runs += page.skipped_runs;
        builder.push_page(&page);
        pb.inc(1);
    }
    pb.finish_and_clear();

    if builder.unknown_lines() > 0 {
        info!("Skipped {} lines in unrecognised fonts", builder.unknown_lines());
    }
    if skipped_runs > 0 {
        warn!("Lost {} text runs that could not be read", skipped_runs);
    }
    Ok(builder.finish())
}
