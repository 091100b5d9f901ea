/* Row buffer layout, all integers little endian:

    ┌───────────┬─────────┬─────────┬──────┬──────────┬─────────┬───────────┬──────────────┐
    │ u32 total │ row id  │ u32     │ u8   │ u64 ref  │ null    │ u32       │ column       │
    │ length    │         │ version │ ref? │ (if ref) │ bitmap  │ section   │ payloads     │
    └───────────┴─────────┴─────────┴──────┴──────────┴─────────┴───────────┴──────────────┘
    └─────────────────── header scope ────────────────┘

The row id is 4 raw bytes, or delta packed against the precedence row's id
when one is given. The null bitmap holds one bit per column (bit i % 8 of
byte i / 8), set when the column is null or excluded by the comparing mask;
such columns write no payload.

Consecutive columns flagged as encrypted form a run. When a run ends the run
is zero padded to the cipher step and encrypted in place. Null columns still
end or extend runs according to their flag.
*/

use crate::bail_corrupt_error;
use crate::column::Column;
use crate::delta;
use crate::row::Row;
use crate::storage::{round_up, Encryption};
use crate::Result;

/// How much of a row buffer is formatted or read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatScope {
    /// Length, row id, version and back reference only.
    Header,
    Full,
}

const LENGTH_PREFIX: usize = 4;
const SECTION_PREFIX: usize = 4;

fn close_run(buf: &mut Vec<u8>, start: usize, encryption: &dyn Encryption) -> Result<()> {
    let padded = round_up(buf.len() - start, encryption.step());
    buf.resize(start + padded, 0);
    encryption.encrypt(&mut buf[start..])
}

struct Run {
    start: usize,
    decrypted_to: usize,
}

impl Run {
    fn decrypt_to(&mut self, section: &mut [u8], upto: usize, encryption: &dyn Encryption) -> Result<()> {
        if upto <= self.decrypted_to {
            return Ok(());
        }
        // whole cipher blocks only
        let target = self.start + round_up(upto - self.start, encryption.step());
        if target > section.len() {
            bail_corrupt_error!(
                "encrypted run needs {target} bytes, column section has {}",
                section.len()
            );
        }
        encryption.decrypt(&mut section[self.decrypted_to..target])?;
        self.decrypted_to = target;
        Ok(())
    }

    fn end(self, cursor: usize, step: usize) -> usize {
        self.start + round_up(cursor - self.start, step)
    }
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32> {
    let Some(raw) = buf.get(pos..pos + 4) else {
        bail_corrupt_error!("row buffer truncated at offset {pos}");
    };
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

impl Row {
    fn precedence_column<'a>(precedence: Option<&'a Row>, index: usize) -> Option<&'a Column> {
        precedence.and_then(|p| p.columns.get(index))
    }

    fn is_skipped(&self, index: usize) -> bool {
        self.columns[index].is_null() || !self.participates(index)
    }

    /// Serializes the row into its scratch buffer and returns the formatted
    /// bytes.
    pub fn format_row_buffer(&mut self, precedence: Option<&Row>, scope: FormatScope) -> Result<&[u8]> {
        let mut buf = std::mem::take(&mut self.buffer);
        buf.clear();
        let result = self.format_into(&mut buf, precedence, scope);
        self.format_length = buf.len();
        self.buffer = buf;
        result?;
        if scope == FormatScope::Full {
            for column in &mut self.columns {
                column.clear_edited();
            }
        }
        Ok(&self.buffer)
    }

    fn format_into(&self, buf: &mut Vec<u8>, precedence: Option<&Row>, scope: FormatScope) -> Result<()> {
        buf.extend_from_slice(&[0; LENGTH_PREFIX]);
        match precedence {
            Some(p) => delta::encode_i32(self.row_id as i32, p.row_id as i32, buf),
            None => buf.extend_from_slice(&self.row_id.to_le_bytes()),
        }
        buf.extend_from_slice(&self.version.raw().to_le_bytes());
        match self.ref_position {
            Some(position) => {
                buf.push(1);
                buf.extend_from_slice(&position.to_le_bytes());
            }
            None => buf.push(0),
        }

        if scope == FormatScope::Full {
            let mut bitmap = vec![0u8; self.columns.len().div_ceil(8)];
            for index in 0..self.columns.len() {
                if self.is_skipped(index) {
                    bitmap[index / 8] |= 1 << (index % 8);
                }
            }
            buf.extend_from_slice(&bitmap);

            let section_len_at = buf.len();
            buf.extend_from_slice(&[0; SECTION_PREFIX]);
            let section_start = buf.len();
            let encryption = self.encryption.as_deref();
            let mut run_start = None;
            for (index, column) in self.columns.iter().enumerate() {
                match encryption {
                    Some(_) if column.is_encrypted() => {
                        run_start.get_or_insert(buf.len());
                    }
                    Some(enc) => {
                        if let Some(start) = run_start.take() {
                            close_run(buf, start, enc)?;
                        }
                    }
                    None => {}
                }
                if self.is_skipped(index) {
                    continue;
                }
                column.to_bytes(buf, Self::precedence_column(precedence, index))?;
            }
            if let (Some(start), Some(enc)) = (run_start, encryption) {
                close_run(buf, start, enc)?;
            }
            let section_len = (buf.len() - section_start) as u32;
            buf[section_len_at..section_start].copy_from_slice(&section_len.to_le_bytes());
        }

        let total = buf.len() as u32;
        buf[..LENGTH_PREFIX].copy_from_slice(&total.to_le_bytes());
        Ok(())
    }

    /// Reads a row buffer produced by [`Self::format_row_buffer`] into this
    /// row, which must carry the same schema. Returns the consumed length.
    pub fn unformat_row_buffer(
        &mut self,
        buf: &[u8],
        precedence: Option<&Row>,
        scope: FormatScope,
    ) -> Result<usize> {
        let total = read_u32(buf, 0)? as usize;
        if total > buf.len() || total < LENGTH_PREFIX {
            bail_corrupt_error!("row buffer announces {total} bytes, {} available", buf.len());
        }
        let buf = &buf[..total];
        let mut pos = LENGTH_PREFIX;

        self.row_id = match precedence {
            Some(p) => {
                let (row_id, used) = delta::decode_i32(&buf[pos..], p.row_id as i32)?;
                pos += used;
                row_id as u32
            }
            None => {
                let row_id = read_u32(buf, pos)?;
                pos += 4;
                row_id
            }
        };
        self.version = super::RowVersion::from_raw(read_u32(buf, pos)?);
        pos += 4;
        let Some(&flag) = buf.get(pos) else {
            bail_corrupt_error!("row buffer truncated before the reference flag");
        };
        pos += 1;
        self.ref_position = match flag {
            0 => None,
            1 => {
                let Some(raw) = buf.get(pos..pos + 8) else {
                    bail_corrupt_error!("row buffer truncated inside the reference");
                };
                pos += 8;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(raw);
                Some(u64::from_le_bytes(bytes))
            }
            other => bail_corrupt_error!("invalid reference flag {other}"),
        };
        if scope == FormatScope::Header {
            return Ok(pos);
        }

        let bitmap_len = self.columns.len().div_ceil(8);
        let Some(bitmap) = buf.get(pos..pos + bitmap_len) else {
            bail_corrupt_error!("row buffer truncated inside the null bitmap");
        };
        let bitmap = bitmap.to_vec();
        pos += bitmap_len;
        let section_len = read_u32(buf, pos)? as usize;
        pos += SECTION_PREFIX;
        let Some(section) = buf.get(pos..pos + section_len) else {
            bail_corrupt_error!("column section of {section_len} bytes exceeds the row buffer");
        };
        let mut section = section.to_vec();
        self.decode_columns(&mut section, &bitmap, precedence)?;
        self.format_length = total;
        Ok(total)
    }

    fn decode_columns(&mut self, section: &mut [u8], bitmap: &[u8], precedence: Option<&Row>) -> Result<()> {
        let encryption = self.encryption.clone();
        let mut cursor = 0;
        let mut run: Option<Run> = None;
        for index in 0..self.columns.len() {
            if let Some(enc) = encryption.as_deref() {
                if self.columns[index].is_encrypted() {
                    run.get_or_insert(Run {
                        start: cursor,
                        decrypted_to: cursor,
                    });
                } else if let Some(finished) = run.take() {
                    cursor = finished.end(cursor, enc.step());
                }
            }

            let column = &mut self.columns[index];
            if bitmap[index / 8] & (1 << (index % 8)) != 0 {
                *column = column.blank();
                continue;
            }
            if cursor > section.len() {
                bail_corrupt_error!("column {index} starts past the column section");
            }
            let precedence_column = Self::precedence_column(precedence, index);
            if let (Some(run), Some(enc)) = (run.as_mut(), encryption.as_deref()) {
                let prefix = column.prefix_len(precedence_column);
                run.decrypt_to(section, cursor + prefix, enc)?;
                let len = column.encoded_len_from_prefix(&section[cursor..], precedence_column)?;
                run.decrypt_to(section, cursor + len, enc)?;
            }
            cursor += column.from_bytes(&section[cursor..], precedence_column)?;
        }
        if let (Some(finished), Some(enc)) = (run, encryption.as_deref()) {
            cursor = finished.end(cursor, enc.step());
        }
        if cursor != section.len() {
            bail_corrupt_error!(
                "column section has {} bytes, columns consumed {cursor}",
                section.len()
            );
        }
        Ok(())
    }
}
