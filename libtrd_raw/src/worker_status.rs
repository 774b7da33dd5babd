#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BarColor {
    #[default]
    CYAN,
    MAGENTA,
    RED,
}

/// Progress message sent from a worker to whoever is drawing the progress bars.
///
/// CYAN is used while decoding, MAGENTA while re-encoding and RED once a worker has failed.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub file_index: usize,
    pub worker_id: usize,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, file_index: usize, worker_id: usize, color: BarColor) -> Self {
        Self {
            progress,
            file_index,
            worker_id,
            color,
        }
    }
}
