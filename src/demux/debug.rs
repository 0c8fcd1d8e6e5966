//! A random-access binary container for the `(masks, signal, solution)`
//! matrix triples produced while demultiplexing, for offline inspection of
//! individual solves.
//!
//! Layout: an `i64` footer-offset slot at byte 0, then the matrix blocks,
//! then a footer of `u64 count` followed by `count` pairs of
//! `(u64 id, i64 offset)`. Each matrix is `i64 rows`, `i64 cols`, and
//! `rows * cols` IEEE-754 doubles in row-major order. All values are
//! little-endian.
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::warn;
use nalgebra::DMatrix;

fn write_i64<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn read_i64<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Write `matrix` in the binary matrix layout. [`DMatrix`] is
/// column-major, so rows are staged through a buffer to put the bytes down
/// row-major.
pub fn write_matrix<W: Write>(writer: &mut W, matrix: &DMatrix<f64>) -> io::Result<()> {
    write_i64(writer, matrix.nrows() as i64)?;
    write_i64(writer, matrix.ncols() as i64)?;
    let mut row_buffer = vec![0.0f64; matrix.ncols()];
    for row in 0..matrix.nrows() {
        for (col, value) in row_buffer.iter_mut().enumerate() {
            *value = matrix[(row, col)];
        }
        if cfg!(target_endian = "little") {
            writer.write_all(bytemuck::cast_slice(&row_buffer))?;
        } else {
            for value in row_buffer.iter() {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

/// Read one matrix in the binary matrix layout
pub fn read_matrix<R: Read>(reader: &mut R) -> io::Result<DMatrix<f64>> {
    let rows = read_i64(reader)?;
    let cols = read_i64(reader)?;
    if rows < 0 || cols < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid matrix dimensions {rows} x {cols}"),
        ));
    }
    let (rows, cols) = (rows as usize, cols as usize);
    let mut flattened = vec![0.0f64; rows * cols];
    if cfg!(target_endian = "little") {
        reader.read_exact(bytemuck::cast_slice_mut(&mut flattened))?;
    } else {
        let mut buf = [0u8; 8];
        for value in flattened.iter_mut() {
            reader.read_exact(&mut buf)?;
            *value = f64::from_le_bytes(buf);
        }
    }
    Ok(DMatrix::from_row_slice(rows, cols, &flattened))
}

/// Appends `(masks, signal, solution)` triples keyed by spectrum id and
/// finalizes the footer index on [`finish`](DemuxDebugWriter::finish) (or
/// best-effort on drop).
pub struct DemuxDebugWriter {
    writer: BufWriter<File>,
    file_index: Vec<(u64, i64)>,
    position: i64,
    finished: bool,
}

impl DemuxDebugWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        // placeholder for the footer offset, patched on finish
        write_i64(&mut writer, 0)?;
        Ok(Self {
            writer,
            file_index: Vec::new(),
            position: std::mem::size_of::<i64>() as i64,
            finished: false,
        })
    }

    /// Append one block of matrices under `spectrum_index`
    pub fn write_block(
        &mut self,
        spectrum_index: u64,
        masks: &DMatrix<f64>,
        signal: &DMatrix<f64>,
        solution: &DMatrix<f64>,
    ) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::other(
                "Attempted to write a block after the debug file was finished",
            ));
        }
        self.file_index.push((spectrum_index, self.position));
        for matrix in [masks, signal, solution] {
            write_matrix(&mut self.writer, matrix)?;
            self.position +=
                (2 + matrix.nrows() * matrix.ncols()) as i64 * std::mem::size_of::<f64>() as i64;
        }
        Ok(())
    }

    /// Write the footer index, patch its offset into the header, and
    /// flush. Further [`write_block`](Self::write_block) calls are
    /// rejected. Called automatically on drop if not called explicitly,
    /// with the error reduced to a log message.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let footer_offset = self.position;
        write_u64(&mut self.writer, self.file_index.len() as u64)?;
        for &(id, offset) in self.file_index.iter() {
            write_u64(&mut self.writer, id)?;
            write_i64(&mut self.writer, offset)?;
        }
        self.writer.seek(SeekFrom::Start(0))?;
        write_i64(&mut self.writer, footer_offset)?;
        self.writer.flush()
    }
}

impl Drop for DemuxDebugWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Failed to finalize demux debug file: {e}");
        }
    }
}

/// Reads blocks written by [`DemuxDebugWriter`], by position or in
/// sequence.
pub struct DemuxDebugReader {
    reader: BufReader<File>,
    file_index: Vec<(u64, i64)>,
    current_block: usize,
}

impl DemuxDebugReader {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let footer_offset = read_i64(&mut reader)?;
        if footer_offset <= 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Demux debug file has no footer index; was the writer finished?",
            ));
        }
        reader.seek(SeekFrom::Start(footer_offset as u64))?;
        let count = read_u64(&mut reader)?;
        let mut file_index = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = read_u64(&mut reader)?;
            let offset = read_i64(&mut reader)?;
            file_index.push((id, offset));
        }
        // rewind to the first block for sequential reads
        reader.seek(SeekFrom::Start(std::mem::size_of::<i64>() as u64))?;
        Ok(Self {
            reader,
            file_index,
            current_block: 0,
        })
    }

    pub fn num_blocks(&self) -> usize {
        self.file_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_index.is_empty()
    }

    /// Read the block at `block_index`, returning the originating spectrum
    /// id and the `(masks, signal, solution)` triple
    pub fn read_block(
        &mut self,
        block_index: usize,
    ) -> io::Result<(u64, DMatrix<f64>, DMatrix<f64>, DMatrix<f64>)> {
        self.current_block = block_index;
        self.read_next_block()
    }

    /// Read the next block in sequence
    pub fn read_next_block(
        &mut self,
    ) -> io::Result<(u64, DMatrix<f64>, DMatrix<f64>, DMatrix<f64>)> {
        let &(id, offset) = self.file_index.get(self.current_block).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Block {} past the end of the debug file", self.current_block),
            )
        })?;
        self.reader.seek(SeekFrom::Start(offset as u64))?;
        let masks = read_matrix(&mut self.reader)?;
        let signal = read_matrix(&mut self.reader)?;
        let solution = read_matrix(&mut self.reader)?;
        self.current_block += 1;
        Ok((id, masks, signal, solution))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn approx_eq(a: &DMatrix<f64>, b: &DMatrix<f64>) -> bool {
        a.shape() == b.shape() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-12)
    }

    #[test]
    fn test_matrix_round_trip() {
        let matrix = DMatrix::from_fn(3, 5, |r, c| (r * 5 + c) as f64 / 7.0);
        let mut buffer = Vec::new();
        write_matrix(&mut buffer, &matrix).unwrap();
        assert_eq!(buffer.len(), 16 + 15 * 8);
        let recovered = read_matrix(&mut buffer.as_slice()).unwrap();
        assert!(approx_eq(&matrix, &recovered));
    }

    #[test]
    fn test_block_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demux_debug.bin");

        let mut blocks = Vec::new();
        for k in 0..3u64 {
            let masks = DMatrix::from_fn(4, 4, |r, c| (r + c) as f64 + k as f64);
            let signal = DMatrix::from_fn(4, 6, |r, c| (r as f64 - c as f64) * (k + 1) as f64);
            let solution = &masks * &signal;
            blocks.push((10 + k, masks, signal, solution));
        }

        let mut writer = DemuxDebugWriter::create(&path).unwrap();
        for (id, masks, signal, solution) in blocks.iter() {
            writer.write_block(*id, masks, signal, solution).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = DemuxDebugReader::open(&path).unwrap();
        assert_eq!(reader.num_blocks(), 3);
        // sequential reads walk the file in write order
        for (id, masks, signal, solution) in blocks.iter() {
            let (read_id, read_masks, read_signal, read_solution) =
                reader.read_next_block().unwrap();
            assert_eq!(read_id, *id);
            assert!(approx_eq(masks, &read_masks));
            assert!(approx_eq(signal, &read_signal));
            assert!(approx_eq(solution, &read_solution));
        }
        assert!(reader.read_next_block().is_err());

        // random access by block position
        let (read_id, _, read_signal, _) = reader.read_block(1).unwrap();
        assert_eq!(read_id, 11);
        assert!(approx_eq(&blocks[1].2, &read_signal));
    }

    #[test]
    fn test_reader_rejects_unfinished_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unfinished.bin");
        std::fs::write(&path, 0i64.to_le_bytes()).unwrap();
        assert!(DemuxDebugReader::open(&path).is_err());
    }
}
