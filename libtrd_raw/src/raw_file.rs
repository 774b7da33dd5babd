use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use super::constants::RDH_SIZE;
use super::error::RawFileError;
use super::rdh::Rdh;

/// A .raw file written by the CRU readout (or by Trap2Cru).
///
/// The file is a sequence of hardware blocks, each an RDH followed by its payload. RawFile
/// hands them out one complete block at a time, ready to be fed to a CruRawReader.
#[derive(Debug)]
pub struct RawFile {
    file_handle: BufReader<File>,
    file_path: PathBuf,
    size_bytes: u64,
    bytes_read: u64,
    is_eof: bool,
}

impl RawFile {
    pub fn new(path: &Path) -> Result<Self, RawFileError> {
        if !path.exists() {
            return Err(RawFileError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let size_bytes = file.metadata()?.len();
        Ok(Self {
            file_handle: BufReader::new(file),
            file_path: path.to_path_buf(),
            size_bytes,
            bytes_read: 0,
            is_eof: size_bytes == 0,
        })
    }

    /// Read the next block (RDH + payload).
    ///
    /// Returns RawFileError::EndOfFile once the file is exhausted on a block boundary. A file
    /// that ends inside a block is an error.
    pub fn get_next_block(&mut self) -> Result<Vec<u8>, RawFileError> {
        if self.is_eof {
            return Err(RawFileError::EndOfFile);
        }

        let mut block = vec![0u8; RDH_SIZE];
        let header_read = self.read_fully(&mut block)?;
        if header_read == 0 {
            self.is_eof = true;
            return Err(RawFileError::EndOfFile);
        } else if header_read < RDH_SIZE {
            self.is_eof = true;
            return Err(RawFileError::TruncatedPage(self.bytes_read));
        }

        let rdh = Rdh::unpack(&block)?;
        let block_size = rdh.offset_to_next as usize;
        block.resize(block_size, 0);
        let body_read = self.read_fully(&mut block[RDH_SIZE..])?;
        if body_read < block_size - RDH_SIZE {
            self.is_eof = true;
            return Err(RawFileError::TruncatedPage(self.bytes_read));
        }

        if self.bytes_read >= self.size_bytes {
            self.is_eof = true;
        }
        Ok(block)
    }

    /// Fill as much of `buffer` as the file allows, returning the number of bytes read
    fn read_fully(&mut self, buffer: &mut [u8]) -> Result<usize, RawFileError> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.file_handle.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(RawFileError::IOError(e)),
            }
        }
        self.bytes_read += filled as u64;
        Ok(filled)
    }

    pub fn is_eof(&self) -> bool {
        self.is_eof
    }

    pub fn get_filename(&self) -> &Path {
        &self.file_path
    }

    pub fn get_size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn get_bytes_read(&self) -> u64 {
        self.bytes_read
    }
}
