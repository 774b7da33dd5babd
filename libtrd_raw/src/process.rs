use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::config::Config;
use super::cru_reader::CruRawReader;
use super::error::{ProcessorError, RawFileError};
use super::raw_file::RawFile;
use super::raw_writer::RawFileWriter;
use super::trap2cru::Trap2Cru;
use super::worker_status::{BarColor, WorkerStatus};

/// Decode every block of a raw file
fn decode_file(
    path: &Path,
    reader: &mut CruRawReader,
    file_index: usize,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let mut raw_file = RawFile::new(path)?;
    let total_size = raw_file.get_size_bytes();
    log::info!(
        "Decoding {} with size {}",
        path.to_string_lossy(),
        human_bytes::human_bytes(total_size as f64)
    );
    let flush_frac: f32 = 0.01;
    let flush_val = (total_size as f64 * flush_frac as f64) as u64;
    let mut count = 0;
    let mut progress: f32 = 0.0;

    tx.send(WorkerStatus::new(0.0, file_index, *worker_id, BarColor::CYAN))?;
    loop {
        match raw_file.get_next_block() {
            Ok(block) => {
                count += block.len() as u64;
                if count > flush_val {
                    count = 0;
                    progress += flush_frac;
                    tx.send(WorkerStatus::new(
                        progress,
                        file_index,
                        *worker_id,
                        BarColor::CYAN,
                    ))?;
                }
                reader.feed_block(&block)?;
            }
            Err(RawFileError::EndOfFile) => break,
            Err(e) => return Err(ProcessorError::RawFile(e)),
        }
    }
    tx.send(WorkerStatus::new(1.0, file_index, *worker_id, BarColor::CYAN))?;
    Ok(())
}

/// Re-encode everything the reader decoded into a new set of raw files
fn reencode(
    config: &Config,
    path: &Path,
    reader: &CruRawReader,
    file_index: usize,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    // Each input file gets its own directory, so workers never share an output file
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("file_{file_index}"));
    let output_dir = config.get_output_directory()?.join(stem);
    let params = config.fee_params();
    let mut writer = RawFileWriter::new(&output_dir, &params)?;
    let mut encoder = Trap2Cru::new(&params);

    let (triggers, tracklets, digits) = reader.event_index().unpack_for_sending(
        reader.tracklets(),
        reader.digits(),
        reader.compressed_digits(),
    );
    log::info!(
        "Re-encoding {} events into {}",
        triggers.len(),
        output_dir.to_string_lossy()
    );

    tx.send(WorkerStatus::new(
        0.0,
        file_index,
        *worker_id,
        BarColor::MAGENTA,
    ))?;
    for (idx, trigger) in triggers.iter().enumerate() {
        encoder.convert(&tracklets, &digits, std::slice::from_ref(trigger), &mut writer)?;
        tx.send(WorkerStatus::new(
            (idx + 1) as f32 / triggers.len() as f32,
            file_index,
            *worker_id,
            BarColor::MAGENTA,
        ))?;
    }
    writer.close()?;
    tx.send(WorkerStatus::new(
        1.0,
        file_index,
        *worker_id,
        BarColor::MAGENTA,
    ))?;
    encoder.stats().log_summary();
    Ok(())
}

/// Decode a single raw file, and re-encode it if the config asks for it.
pub fn process_file(
    config: &Config,
    path: &Path,
    file_index: usize,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let mut reader = CruRawReader::new(&config.fee_params());
    decode_file(path, &mut reader, file_index, tx, worker_id)?;
    reader.stats().log_summary();
    reader.event_index().log_records();
    if reader.event_index().lookup_misses() > 0 {
        log::warn!(
            "{} event index lookups missed",
            reader.event_index().lookup_misses()
        );
    }

    if config.need_reencode() {
        reencode(config, path, &reader, file_index, tx, worker_id)?;
    }
    Ok(())
}

/// Process a subset of files. On failure the worker's bar turns RED and the error is
/// returned.
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<(usize, PathBuf)>,
) -> Result<(), ProcessorError> {
    for (file_index, path) in subset {
        log::info!("Processing file {}...", path.to_string_lossy());
        if let Err(e) = process_file(&config, &path, file_index, &tx, &worker_id) {
            tx.send(WorkerStatus::new(1.0, file_index, worker_id, BarColor::RED))?;
            return Err(e);
        }
        log::info!("Finished processing file {}.", path.to_string_lossy());
    }
    Ok(())
}

/// Divide the raw files into a set of subsets (per thread/worker). Each file keeps its index
/// in the full list.
pub fn create_subsets(config: &Config, files: &[PathBuf]) -> Vec<Vec<(usize, PathBuf)>> {
    let mut subsets: Vec<Vec<(usize, PathBuf)>> =
        vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, file) in files.iter().enumerate() {
        subsets[idx % n_subsets].push((idx, file.clone()))
    }

    subsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeeParams;
    use crate::digit::Digit;
    use crate::event_index::{InteractionRecord, TriggerRecord};
    use crate::link_map::HalfCruId;
    use crate::tracklet::Tracklet;

    #[test]
    fn test_create_subsets() {
        let config = Config {
            n_threads: 3,
            ..Default::default()
        };
        let files: Vec<PathBuf> = (0..7)
            .map(|n| PathBuf::from(format!("trd_cru_{n}_a_run3.raw")))
            .collect();
        let subsets = create_subsets(&config, &files);
        assert_eq!(subsets.len(), 3);
        assert_eq!(subsets[0].len(), 3);
        assert_eq!(subsets[2].len(), 2);
        assert_eq!(subsets[1][1], (4, files[4].clone()));
    }

    #[test]
    fn test_decode_and_reencode_file() {
        let raw_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let params = FeeParams {
            skip_empty_half_crus: true,
            ..Default::default()
        };

        let tracklets = vec![
            Tracklet::from_chip(3, 0, 2, 40, 5, 6, 7, 8),
            Tracklet::from_chip(3, 2, 11, 41, 5, 6, 7, 8),
        ];
        let digits = vec![Digit::new(3, 2, 11, 4, [100; 30])];
        let triggers = vec![
            TriggerRecord::new(InteractionRecord::new(10, 1), 0, 1, 0, 0),
            TriggerRecord::new(InteractionRecord::new(20, 1), 1, 1, 0, 1),
        ];
        let mut writer = RawFileWriter::new(raw_dir.path(), &params).unwrap();
        Trap2Cru::new(&params)
            .convert(&tracklets, &digits, &triggers, &mut writer)
            .unwrap();
        let input = writer.get_file_path(&HalfCruId::new(0).unwrap());
        writer.close().unwrap();

        let config = Config {
            raw_path: raw_dir.path().to_path_buf(),
            output_path: out_dir.path().to_path_buf(),
            reencode: true,
            skip_empty_half_crus: true,
            ..Default::default()
        };
        let files = config.get_raw_files().unwrap();
        assert_eq!(files, vec![input.clone()]);

        let (tx, rx) = std::sync::mpsc::channel();
        let subset = create_subsets(&config, &files).remove(0);
        process_subset(config, tx, 0, subset).unwrap();

        let statuses: Vec<WorkerStatus> = rx.try_iter().collect();
        assert!(statuses.iter().any(|status| status.color == BarColor::MAGENTA));
        assert!(statuses.iter().all(|status| status.color != BarColor::RED));

        let output = out_dir
            .path()
            .join("trd_cru_0_a_run3")
            .join("trd_cru_0_a_run3.raw");
        assert_eq!(std::fs::read(output).unwrap(), std::fs::read(input).unwrap());
    }

    #[test]
    fn test_failed_file_turns_red() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trd_cru_0_a_run3.raw");
        std::fs::write(&path, [0u8; 10]).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let result = process_subset(Config::default(), tx, 2, vec![(0, path)]);
        assert!(matches!(result, Err(ProcessorError::RawFile(_))));
        let last = rx.try_iter().last().unwrap();
        assert_eq!(last.color, BarColor::RED);
        assert_eq!(last.worker_id, 2);
    }
}
