use std::{path::PathBuf, sync::Arc};

use crate::extractor::MediaExtractor;

#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn MediaExtractor>,
    /// Shared output directory; each download gets its own subdirectory.
    pub download_dir: PathBuf,
    pub stale_job_seconds: u64,
}
