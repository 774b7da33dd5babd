//! # trd_raw
//!
//! trd_raw is a decoder and encoder for the raw data of the Transition Radiation Detector
//! (TRD) front end, written in Rust. It reads the data stream the Common Readout Units
//! (CRUs) produce from the TRAP chips, turns it into flat vectors of tracklets and digits
//! indexed by interaction, and can convert those vectors back into the CRU wire format.
//!
//! ## Installation
//!
//! Currently the only method of install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./trd_raw_cli` from the top level
//! trd_raw repository. The binary will be installed to your cargo install location
//! (typically something like `~/.cargo/bin/`).
//!
//! ## Data flow
//!
//! A CRU serves two half-CRUs (one per endpoint), each reading out 15 optical links. For
//! every trigger a half-CRU sends a 64 byte header giving the size of each link's data,
//! followed by the link data itself. On disk and on the wire this stream is chopped into
//! hardware blocks of at most 64 kB, each starting with a Raw Data Header (RDH).
//!
//! - [`raw_file::RawFile`] hands out one block at a time from a `.raw` file.
//! - [`cru_reader::CruRawReader`] consumes blocks, reassembles half-CRUs that straddle
//!   blocks and parses every link into [`tracklet::Tracklet`]s and [`digit::Digit`]s. The
//!   [`event_index::EventIndex`] records which slice of the flat vectors belongs to which
//!   interaction.
//! - [`trap2cru::Trap2Cru`] does the reverse: it sorts flat vectors into links, builds each
//!   half-CRU and hands it to a [`raw_writer::RawSink`] which pages it into blocks.
//!
//! ## Configuration
//!
//! The CLI reads a YAML configuration file (`trd_raw_cli new -p config.yml` writes a
//! template). The format is as follows:
//!
//! ```yml
//! raw_path: /path/to/raw/files
//! output_path: /path/to/output
//! format: Run3
//! max_half_cru_bytes: 4194304
//! page_size: 8192
//! keep_compressed_digits: false
//! reencode: false
//! skip_empty_half_crus: false
//! n_threads: 1
//! ```
//!
//! - `raw_path`: directory holding the `trd_cru_*.raw` files to decode
//! - `output_path`: directory re-encoded files are written to
//! - `format`: `Run2` or `Run3`. Run3 links carry a tracklet half-chamber header word.
//! - `max_half_cru_bytes`: the largest half-CRU the reader will assemble
//! - `page_size`: size of the hardware blocks written when re-encoding
//! - `keep_compressed_digits`: keep digits in their packed wire form
//! - `reencode`: convert the decoded data back to raw files
//! - `skip_empty_half_crus`: do not write half-CRUs without any data
//! - `n_threads`: number of worker threads the files are divided amongst. Must be at
//!   least 1.
//!
//! ## Output
//!
//! Decoding produces a summary of what was read, logged to the terminal and the log file.
//! When re-encoding, each input file gets a directory in `output_path` named after the
//! file, holding one `trd_cru_<cru>_<a|c>_<run2|run3>.raw` file per half-CRU.
pub mod config;
pub mod constants;
pub mod cru_reader;
pub mod cursor;
pub mod digit;
pub mod digit_parser;
pub mod error;
pub mod event_index;
pub mod link_map;
pub mod process;
pub mod raw_data;
pub mod raw_file;
pub mod raw_writer;
pub mod rdh;
pub mod stats;
pub mod tracklet;
pub mod tracklet_parser;
pub mod trap2cru;
pub mod worker_status;
