//! Update record value type and codec

use std::fmt;

use bytes::{Buf, BufMut};

use super::{TRNU_EST_COUNT, TRNU_PUB_BYTES, TRNU_PUB_SYNC};
use crate::protocol::{Error, Result};

/// Position estimate with covariance
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Estimate {
    /// Estimate time (epoch seconds)
    pub time: f64,
    /// North (m)
    pub x: f64,
    /// East (m)
    pub y: f64,
    /// Down (m)
    pub z: f64,
    /// Covariance terms: x, y, z variances and the xy cross term
    pub cov: [f64; 4],
}

impl Estimate {
    const ENCODED_LEN: usize = 8 * 8;

    fn encode_into(&self, out: &mut impl BufMut) {
        out.put_f64_le(self.time);
        out.put_f64_le(self.x);
        out.put_f64_le(self.y);
        out.put_f64_le(self.z);
        for c in self.cov {
            out.put_f64_le(c);
        }
    }

    fn decode_from(buf: &mut impl Buf) -> Self {
        Self {
            time: buf.get_f64_le(),
            x: buf.get_f64_le(),
            y: buf.get_f64_le(),
            z: buf.get_f64_le(),
            cov: [
                buf.get_f64_le(),
                buf.get_f64_le(),
                buf.get_f64_le(),
                buf.get_f64_le(),
            ],
        }
    }
}

/// Filter type reported by the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterState {
    /// No filter
    #[default]
    None,
    /// Point mass filter
    PointMass,
    /// Particle filter
    Particle,
    /// Filter bank
    Bank,
    /// Value outside the known range
    Unknown(i32),
}

impl FilterState {
    /// Convert from the wire value
    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::None,
            1 => Self::PointMass,
            2 => Self::Particle,
            3 => Self::Bank,
            other => Self::Unknown(other),
        }
    }

    /// Convert to the wire value
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::None => 0,
            Self::PointMass => 1,
            Self::Particle => 2,
            Self::Bank => 3,
            Self::Unknown(other) => other,
        }
    }
}

/// TRN update record
///
/// # Wire Format
///
/// ```text
/// u32 sync
/// estimate[5]        pt, mle, mmse, offset, last_good
///                    (f64 time, x, y, z, cov[4])
/// i32 reinit_count
/// f64 reinit_tlast
/// i32 filter_state
/// i32 success
/// i16 is_converged
/// i16 is_valid
/// i32 mb1_cycle
/// i32 ping_number
/// i32 n_con_seq, n_con_tot, n_uncon_seq, n_uncon_tot
/// f64 mb1_time
/// f64 reinit_time
/// f64 update_time
/// ```
///
/// Packed, little-endian, `TRNU_PUB_BYTES` long.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateRecord {
    /// Raw filter pose
    pub pt: Estimate,
    /// Maximum likelihood estimate
    pub mle: Estimate,
    /// Minimum mean square error estimate
    pub mmse: Estimate,
    /// Current nav-to-TRN offset
    pub offset: Estimate,
    /// Most recent reliable offset
    pub last_good: Estimate,
    /// Number of filter reinits
    pub reinit_count: i32,
    /// Time of the last reinit (epoch seconds)
    pub reinit_tlast: f64,
    /// Filter type
    pub filter_state: FilterState,
    /// Last measurement accepted (nonzero)
    pub success: i32,
    /// Convergence heuristic (nonzero when converged)
    pub is_converged: i16,
    /// Covariance-threshold usability (nonzero when valid)
    pub is_valid: i16,
    /// MB1 record cycle
    pub mb1_cycle: i32,
    /// Sonar ping number
    pub ping_number: i32,
    /// Consecutive converged updates
    pub n_con_seq: i32,
    /// Total converged updates
    pub n_con_tot: i32,
    /// Consecutive unconverged updates
    pub n_uncon_seq: i32,
    /// Total unconverged updates
    pub n_uncon_tot: i32,
    /// MB1 sensor timestamp (epoch seconds)
    pub mb1_time: f64,
    /// Reinit time (epoch seconds)
    pub reinit_time: f64,
    /// Server processing timestamp (epoch seconds)
    pub update_time: f64,
}

impl UpdateRecord {
    /// Estimates in wire order
    #[must_use]
    pub fn estimates(&self) -> [&Estimate; TRNU_EST_COUNT] {
        [&self.pt, &self.mle, &self.mmse, &self.offset, &self.last_good]
    }

    /// Last measurement accepted
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.success != 0
    }

    /// Convergence heuristic flag
    #[must_use]
    pub const fn converged(&self) -> bool {
        self.is_converged != 0
    }

    /// Covariance-threshold usability flag
    #[must_use]
    pub const fn valid(&self) -> bool {
        self.is_valid != 0
    }

    /// Append the encoded record to `out`
    pub fn encode_into(&self, out: &mut impl BufMut) {
        out.put_u32_le(TRNU_PUB_SYNC);
        for est in self.estimates() {
            est.encode_into(out);
        }
        out.put_i32_le(self.reinit_count);
        out.put_f64_le(self.reinit_tlast);
        out.put_i32_le(self.filter_state.as_i32());
        out.put_i32_le(self.success);
        out.put_i16_le(self.is_converged);
        out.put_i16_le(self.is_valid);
        out.put_i32_le(self.mb1_cycle);
        out.put_i32_le(self.ping_number);
        out.put_i32_le(self.n_con_seq);
        out.put_i32_le(self.n_con_tot);
        out.put_i32_le(self.n_uncon_seq);
        out.put_i32_le(self.n_uncon_tot);
        out.put_f64_le(self.mb1_time);
        out.put_f64_le(self.reinit_time);
        out.put_f64_le(self.update_time);
    }

    /// Encode to a fixed-size buffer
    #[must_use]
    pub fn to_bytes(&self) -> [u8; TRNU_PUB_BYTES] {
        let mut bytes = [0u8; TRNU_PUB_BYTES];
        self.encode_into(&mut &mut bytes[..]);
        bytes
    }

    /// Decode a record
    ///
    /// `bytes` must be exactly `TRNU_PUB_BYTES` long and start with the
    /// record sync word.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != TRNU_PUB_BYTES {
            return Err(Error::MalformedPayload {
                what: "update",
                reason: format!("expected {TRNU_PUB_BYTES} bytes, got {}", bytes.len()),
            });
        }

        let mut buf = bytes;
        let sync = buf.get_u32_le();
        if sync != TRNU_PUB_SYNC {
            return Err(Error::InvalidSync {
                expected: TRNU_PUB_SYNC,
                found: sync,
            });
        }

        let pt = Estimate::decode_from(&mut buf);
        let mle = Estimate::decode_from(&mut buf);
        let mmse = Estimate::decode_from(&mut buf);
        let offset = Estimate::decode_from(&mut buf);
        let last_good = Estimate::decode_from(&mut buf);

        Ok(Self {
            pt,
            mle,
            mmse,
            offset,
            last_good,
            reinit_count: buf.get_i32_le(),
            reinit_tlast: buf.get_f64_le(),
            filter_state: FilterState::from_i32(buf.get_i32_le()),
            success: buf.get_i32_le(),
            is_converged: buf.get_i16_le(),
            is_valid: buf.get_i16_le(),
            mb1_cycle: buf.get_i32_le(),
            ping_number: buf.get_i32_le(),
            n_con_seq: buf.get_i32_le(),
            n_con_tot: buf.get_i32_le(),
            n_uncon_seq: buf.get_i32_le(),
            n_uncon_tot: buf.get_i32_le(),
            mb1_time: buf.get_f64_le(),
            reinit_time: buf.get_f64_le(),
            update_time: buf.get_f64_le(),
        })
    }

    /// Check whether a datagram starts with the record sync word
    #[must_use]
    pub fn has_sync(bytes: &[u8]) -> bool {
        bytes.len() >= 4 && bytes[..4] == TRNU_PUB_SYNC.to_le_bytes()
    }

    /// CSV column names matching [`UpdateRecord::to_csv`]
    #[must_use]
    pub fn csv_header() -> String {
        let mut cols = vec!["update_time".to_string(), "mb1_time".to_string()];
        for name in ["pt", "mle", "mmse", "ofs", "last_good"] {
            for field in ["time", "x", "y", "z", "cov0", "cov1", "cov2", "cov3"] {
                cols.push(format!("{name}_{field}"));
            }
        }
        cols.extend(
            [
                "reinit_count",
                "reinit_tlast",
                "reinit_time",
                "filter_state",
                "success",
                "is_converged",
                "is_valid",
                "mb1_cycle",
                "ping_number",
                "n_con_seq",
                "n_con_tot",
                "n_uncon_seq",
                "n_uncon_tot",
            ]
            .map(String::from),
        );
        cols.join(",")
    }

    /// One CSV row
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut cols = vec![format!("{:.3}", self.update_time), format!("{:.3}", self.mb1_time)];
        for est in self.estimates() {
            cols.push(format!("{:.3}", est.time));
            cols.push(format!("{:.4}", est.x));
            cols.push(format!("{:.4}", est.y));
            cols.push(format!("{:.4}", est.z));
            cols.extend(est.cov.iter().map(|c| format!("{c:.4}")));
        }
        cols.push(self.reinit_count.to_string());
        cols.push(format!("{:.3}", self.reinit_tlast));
        cols.push(format!("{:.3}", self.reinit_time));
        cols.push(self.filter_state.as_i32().to_string());
        cols.push(self.success.to_string());
        cols.push(self.is_converged.to_string());
        cols.push(self.is_valid.to_string());
        cols.push(self.mb1_cycle.to_string());
        cols.push(self.ping_number.to_string());
        cols.push(self.n_con_seq.to_string());
        cols.push(self.n_con_tot.to_string());
        cols.push(self.n_uncon_seq.to_string());
        cols.push(self.n_uncon_tot.to_string());
        cols.join(",")
    }
}

impl fmt::Display for UpdateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "update_time {:.3} mb1_time {:.3} ping {} cycle {}",
            self.update_time, self.mb1_time, self.ping_number, self.mb1_cycle
        )?;
        writeln!(
            f,
            "filter {:?} success {} converged {} valid {} reinits {} (last {:.3})",
            self.filter_state,
            self.succeeded(),
            self.converged(),
            self.valid(),
            self.reinit_count,
            self.reinit_tlast
        )?;
        writeln!(
            f,
            "con seq/tot {}/{} uncon seq/tot {}/{}",
            self.n_con_seq, self.n_con_tot, self.n_uncon_seq, self.n_uncon_tot
        )?;
        for (name, est) in ["pt", "mle", "mmse", "ofs", "lgo"]
            .iter()
            .zip(self.estimates())
        {
            writeln!(
                f,
                "{name:>4} t {:.3} x {:.4} y {:.4} z {:.4} cov [{:.4}, {:.4}, {:.4}, {:.4}]",
                est.time, est.x, est.y, est.z, est.cov[0], est.cov[1], est.cov[2], est.cov[3]
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UpdateRecord {
        UpdateRecord {
            mle: Estimate {
                time: 1_700_000_000.5,
                x: 4_063_000.25,
                y: 590_000.75,
                z: 812.0,
                cov: [1.0, 2.0, 3.0, 0.5],
            },
            offset: Estimate {
                x: -3.5,
                y: 1.25,
                ..Estimate::default()
            },
            reinit_count: 2,
            filter_state: FilterState::Particle,
            success: 1,
            is_converged: 1,
            is_valid: 0,
            ping_number: 1234,
            n_con_seq: 7,
            update_time: 1_700_000_001.0,
            ..UpdateRecord::default()
        }
    }

    #[test]
    fn test_layout() {
        let record = sample();
        let bytes = record.to_bytes();

        assert_eq!(&bytes[0..4], b"TZDS");
        // mle.x is the second field of the second estimate
        assert_eq!(&bytes[4 + 64 + 8..4 + 64 + 16], &4_063_000.25f64.to_le_bytes());
        assert_eq!(&bytes[324..328], &2i32.to_le_bytes());
        assert_eq!(&bytes[336..340], &2i32.to_le_bytes());
        assert_eq!(&bytes[344..346], &1i16.to_le_bytes());
        assert_eq!(&bytes[352..356], &1234i32.to_le_bytes());
        assert_eq!(&bytes[388..396], &1_700_000_001.0f64.to_le_bytes());
    }

    #[test]
    fn test_roundtrip() {
        let record = sample();
        let decoded = UpdateRecord::from_bytes(&record.to_bytes()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_rejects_wrong_size() {
        let bytes = sample().to_bytes();
        assert!(UpdateRecord::from_bytes(&bytes[..TRNU_PUB_BYTES - 1]).is_err());

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(UpdateRecord::from_bytes(&long).is_err());
    }

    #[test]
    fn test_rejects_bad_sync() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            UpdateRecord::from_bytes(&bytes),
            Err(Error::InvalidSync { .. })
        ));
        assert!(!UpdateRecord::has_sync(&bytes));
        assert!(UpdateRecord::has_sync(&sample().to_bytes()));
        assert!(!UpdateRecord::has_sync(b"TZ"));
    }

    #[test]
    fn test_unknown_filter_state_preserved() {
        let mut record = sample();
        record.filter_state = FilterState::from_i32(9);
        let decoded = UpdateRecord::from_bytes(&record.to_bytes()).unwrap();
        assert_eq!(decoded.filter_state, FilterState::Unknown(9));
        assert_eq!(decoded.filter_state.as_i32(), 9);
    }

    #[test]
    fn test_flags_independent() {
        let record = sample();
        assert!(record.converged());
        assert!(!record.valid());
        assert!(record.succeeded());
    }

    #[test]
    fn test_csv_columns_match() {
        let header = UpdateRecord::csv_header();
        let row = sample().to_csv();
        assert_eq!(header.split(',').count(), row.split(',').count());
        assert!(row.contains(",1234,"));
    }

    #[test]
    fn test_display() {
        let text = sample().to_string();
        assert!(text.contains("ping 1234"));
        assert!(text.contains("filter Particle"));
        assert!(text.contains(" mle t 1700000000.500 x 4063000.2500"));
    }
}
