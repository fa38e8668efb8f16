// src/bet.rs
//! Bet record and its wire codec.
//!
//! One bet travels as a fixed 12-byte header of six big-endian `u16` values,
//! followed by the six field texts packed back to back. Each header value is
//! the *cumulative end offset* of a field, measured from the start of the
//! record (header included), so the last value is also the total encoded
//! length, which lets a caller decode records back to back from one buffer.
//!
//! ```text
//! [agency_end][first_name_end][last_name_end][document_end][birthdate_end][number_end]
//! [agency text][first_name][last_name][document][birthdate "YYYY-MM-DD"][number text]
//! ```
//!
//! Decoding distinguishes two failure kinds: [`DecodeError::Incomplete`]
//! (the buffer simply ends too early; wait for more bytes) and
//! [`DecodeError::Malformed`] (the bytes can never become a valid bet;
//! abort the connection). Callers rely on this split, so truncation is never
//! reported as malformed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed size of the offset header: six big-endian `u16` field end offsets.
pub const HEADER_SIZE: usize = 12;

/// The number a bet must carry to win the draw.
pub const WINNING_NUMBER: u32 = 7574;

/// A single lottery bet, immutable once decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub agency: u32,
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birthdate: NaiveDate,
    pub number: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ends before the record does; `needed` more bytes complete it.
    #[error("incomplete bet record: {needed} more bytes needed")]
    Incomplete { needed: usize },
    /// The bytes cannot form a valid bet regardless of further input.
    #[error("malformed bet record: {0}")]
    Malformed(String),
}

impl Bet {
    /// Decode one bet from the front of `buf`.
    ///
    /// On success returns the bet and the number of bytes consumed (the final
    /// header offset), so the caller can continue decoding at `buf[consumed..]`.
    pub fn decode(buf: &[u8]) -> Result<(Bet, usize), DecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(DecodeError::Incomplete {
                needed: HEADER_SIZE - buf.len(),
            });
        }

        let mut ends = [0usize; 6];
        for (i, end) in ends.iter_mut().enumerate() {
            *end = u16::from_be_bytes([buf[2 * i], buf[2 * i + 1]]) as usize;
        }

        let total = ends[5];
        if buf.len() < total {
            return Err(DecodeError::Incomplete {
                needed: total - buf.len(),
            });
        }

        if ends[0] < HEADER_SIZE {
            return Err(DecodeError::Malformed(format!(
                "first field ends at {} inside the {HEADER_SIZE}-byte header",
                ends[0]
            )));
        }
        if ends.windows(2).any(|w| w[1] < w[0]) {
            return Err(DecodeError::Malformed(format!(
                "field end offsets not monotonic: {ends:?}"
            )));
        }

        fn field(buf: &[u8], start: usize, end: usize) -> Result<&str, DecodeError> {
            std::str::from_utf8(&buf[start..end])
                .map_err(|e| DecodeError::Malformed(format!("invalid utf-8 field: {e}")))
        }

        let agency_txt = field(buf, HEADER_SIZE, ends[0])?;
        let first_name = field(buf, ends[0], ends[1])?;
        let last_name = field(buf, ends[1], ends[2])?;
        let document = field(buf, ends[2], ends[3])?;
        let birthdate_txt = field(buf, ends[3], ends[4])?;
        let number_txt = field(buf, ends[4], ends[5])?;

        let agency: u32 = agency_txt
            .parse()
            .map_err(|_| DecodeError::Malformed(format!("non-numeric agency {agency_txt:?}")))?;
        let number: u32 = number_txt
            .parse()
            .map_err(|_| DecodeError::Malformed(format!("non-numeric number {number_txt:?}")))?;
        let birthdate = NaiveDate::parse_from_str(birthdate_txt, "%Y-%m-%d")
            .map_err(|_| DecodeError::Malformed(format!("bad birthdate {birthdate_txt:?}")))?;

        Ok((
            Bet {
                agency,
                first_name: first_name.to_owned(),
                last_name: last_name.to_owned(),
                document: document.to_owned(),
                birthdate,
                number,
            },
            total,
        ))
    }

    /// Append the wire encoding of this bet to `out` (inverse of [`Bet::decode`]).
    pub fn encode(&self, out: &mut Vec<u8>) {
        let fields = [
            self.agency.to_string(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.document.clone(),
            self.birthdate.format("%Y-%m-%d").to_string(),
            self.number.to_string(),
        ];

        let mut end = HEADER_SIZE;
        for f in &fields {
            end += f.len();
            out.extend_from_slice(&(end as u16).to_be_bytes());
        }
        for f in &fields {
            out.extend_from_slice(f.as_bytes());
        }
    }

    /// Whether this bet wins the draw. Pure function of `number`.
    #[inline]
    pub fn has_won(&self) -> bool {
        self.number == WINNING_NUMBER
    }
}
