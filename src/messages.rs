//! The eight HPGP management message payloads plus the Set-Key pair.
//! Field layouts and the exact byte offsets below are taken from the
//! HomePlug Green PHY spec as implemented by the reference ISO 15118-3 SLAC
//! stack this protocol was distilled from; where a message's informal size
//! note disagreed with its own byte-offset table, the offsets win.

use crate::error::ParseError;
use crate::mac::MacAddr;

fn need(buf: &[u8], len: usize) -> Result<(), ParseError> {
    if buf.len() < len {
        Err(ParseError::TooShort { got: buf.len(), need: len })
    } else {
        Ok(())
    }
}

fn mac_at(buf: &[u8], at: usize) -> MacAddr {
    MacAddr::from_slice(&buf[at..at + 6]).expect("bounds checked by caller")
}

fn arr17_at(buf: &[u8], at: usize) -> [u8; 17] {
    let mut out = [0u8; 17];
    out.copy_from_slice(&buf[at..at + 17]);
    out
}

fn arr8_at(buf: &[u8], at: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[at..at + 8]);
    out
}

// ── CM_SET_KEY ──────────────────────────────────────────────────────────

const SET_KEY_MY_NONCE: [u8; 4] = [0xaa, 0xaa, 0xaa, 0xaa];
const SET_KEY_YOUR_NONCE: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
const SET_KEY_PID: u8 = 0x04;
const SET_KEY_PRN: [u8; 2] = [0x00, 0x00];
const SET_KEY_PMN: u8 = 0x00;
const SET_KEY_CCO_CAP: u8 = 0x00;
const SET_KEY_TYPE: u8 = 0x01;
const SET_KEY_NEW_EKS: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetKeyReq {
    pub nid: [u8; 7],
    pub new_key: [u8; 16],
}

impl SetKeyReq {
    pub const LEN: usize = 38;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(SET_KEY_TYPE);
        out.extend_from_slice(&SET_KEY_MY_NONCE);
        out.extend_from_slice(&SET_KEY_YOUR_NONCE);
        out.push(SET_KEY_PID);
        out.extend_from_slice(&SET_KEY_PRN);
        out.push(SET_KEY_PMN);
        out.push(SET_KEY_CCO_CAP);
        out.extend_from_slice(&self.nid);
        out.push(SET_KEY_NEW_EKS);
        out.extend_from_slice(&self.new_key);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, Self::LEN)?;
        let mut nid = [0u8; 7];
        nid.copy_from_slice(&buf[14..21]);
        let mut new_key = [0u8; 16];
        new_key.copy_from_slice(&buf[22..38]);
        Ok(SetKeyReq { nid, new_key })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetKeyCnf {
    pub result: u8,
    pub my_nonce: [u8; 4],
    pub your_nonce: [u8; 4],
    pub pid: u8,
    pub prn: [u8; 2],
    pub pmn: u8,
    pub cco_cap: u8,
}

impl SetKeyCnf {
    pub const LEN: usize = 14;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.result);
        out.extend_from_slice(&self.my_nonce);
        out.extend_from_slice(&self.your_nonce);
        out.push(self.pid);
        out.extend_from_slice(&self.prn);
        out.push(self.pmn);
        out.push(self.cco_cap);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, Self::LEN)?;
        let mut my_nonce = [0u8; 4];
        my_nonce.copy_from_slice(&buf[1..5]);
        let mut your_nonce = [0u8; 4];
        your_nonce.copy_from_slice(&buf[5..9]);
        let mut prn = [0u8; 2];
        prn.copy_from_slice(&buf[10..12]);
        Ok(SetKeyCnf {
            result: buf[0],
            my_nonce,
            your_nonce,
            pid: buf[9],
            prn,
            pmn: buf[12],
            cco_cap: buf[13],
        })
    }
}

// ── CM_SLAC_PARM ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlacParmReq {
    pub app_type: u8,
    pub sec_type: u8,
    pub run_id: [u8; 8],
}

impl SlacParmReq {
    pub const LEN: usize = 10;

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, Self::LEN)?;
        Ok(SlacParmReq { app_type: buf[0], sec_type: buf[1], run_id: arr8_at(buf, 2) })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.app_type);
        out.push(self.sec_type);
        out.extend_from_slice(&self.run_id);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlacParmCnf {
    pub msound_target: MacAddr,
    pub num_sounds: u8,
    pub time_out: u8,
    pub resp_type: u8,
    pub forwarding_sta: MacAddr,
    pub app_type: u8,
    pub sec_type: u8,
    pub run_id: [u8; 8],
}

impl SlacParmCnf {
    pub const LEN: usize = 25;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(self.msound_target.as_bytes());
        out.push(self.num_sounds);
        out.push(self.time_out);
        out.push(self.resp_type);
        out.extend_from_slice(self.forwarding_sta.as_bytes());
        out.push(self.app_type);
        out.push(self.sec_type);
        out.extend_from_slice(&self.run_id);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, Self::LEN)?;
        Ok(SlacParmCnf {
            msound_target: mac_at(buf, 0),
            num_sounds: buf[6],
            time_out: buf[7],
            resp_type: buf[8],
            forwarding_sta: mac_at(buf, 9),
            app_type: buf[15],
            sec_type: buf[16],
            run_id: arr8_at(buf, 17),
        })
    }
}

// ── CM_START_ATTEN_CHAR ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartAttenChar {
    pub app_type: u8,
    pub sec_type: u8,
    pub num_sounds: u8,
    pub time_out: u8,
    pub resp_type: u8,
    pub forwarding_sta: MacAddr,
    pub run_id: [u8; 8],
}

impl StartAttenChar {
    pub const LEN: usize = 19;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.app_type);
        out.push(self.sec_type);
        out.push(self.num_sounds);
        out.push(self.time_out);
        out.push(self.resp_type);
        out.extend_from_slice(self.forwarding_sta.as_bytes());
        out.extend_from_slice(&self.run_id);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, Self::LEN)?;
        Ok(StartAttenChar {
            app_type: buf[0],
            sec_type: buf[1],
            num_sounds: buf[2],
            time_out: buf[3],
            resp_type: buf[4],
            forwarding_sta: mac_at(buf, 5),
            run_id: arr8_at(buf, 11),
        })
    }
}

// ── CM_MNBC_SOUND ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MnbcSound {
    pub app_type: u8,
    pub sec_type: u8,
    pub sender_id: [u8; 17],
    pub cnt: u8,
    pub run_id: [u8; 8],
    pub reserved: [u8; 8],
    pub rnd: [u8; 16],
}

impl MnbcSound {
    pub const LEN: usize = 52;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.app_type);
        out.push(self.sec_type);
        out.extend_from_slice(&self.sender_id);
        out.push(self.cnt);
        out.extend_from_slice(&self.run_id);
        out.extend_from_slice(&self.reserved);
        out.extend_from_slice(&self.rnd);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, Self::LEN)?;
        let mut rnd = [0u8; 16];
        rnd.copy_from_slice(&buf[36..52]);
        Ok(MnbcSound {
            app_type: buf[0],
            sec_type: buf[1],
            sender_id: arr17_at(buf, 2),
            cnt: buf[19],
            run_id: arr8_at(buf, 20),
            reserved: arr8_at(buf, 28),
            rnd,
        })
    }
}

// ── CM_ATTEN_PROFILE ─────────────────────────────────────────────────────

/// Number of OFDM carrier groups the sound-accumulator tracks.
pub const NUM_GROUPS: usize = 58;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttenProfile {
    pub pev_mac: MacAddr,
    pub num_groups: u8,
    pub reserved: u8,
    pub aag: Vec<u8>,
}

impl AttenProfile {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.aag.len());
        out.extend_from_slice(self.pev_mac.as_bytes());
        out.push(self.num_groups);
        out.push(self.reserved);
        out.extend_from_slice(&self.aag);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, 8)?;
        let num_groups = buf[6];
        let end = 8 + num_groups as usize;
        need(buf, end)?;
        Ok(AttenProfile {
            pev_mac: mac_at(buf, 0),
            num_groups,
            reserved: buf[7],
            aag: buf[8..end].to_vec(),
        })
    }
}

// ── CM_ATTEN_CHAR ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttenChar {
    pub app_type: u8,
    pub sec_type: u8,
    pub source_address: MacAddr,
    pub run_id: [u8; 8],
    pub source_id: [u8; 17],
    pub resp_id: [u8; 17],
    pub num_sounds: u8,
    pub num_groups: u8,
    pub aag: Vec<u8>,
}

impl AttenChar {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(52 + self.aag.len());
        out.push(self.app_type);
        out.push(self.sec_type);
        out.extend_from_slice(self.source_address.as_bytes());
        out.extend_from_slice(&self.run_id);
        out.extend_from_slice(&self.source_id);
        out.extend_from_slice(&self.resp_id);
        out.push(self.num_sounds);
        out.push(self.num_groups);
        out.extend_from_slice(&self.aag);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, 52)?;
        let num_groups = buf[51];
        let end = 52 + num_groups as usize;
        need(buf, end)?;
        Ok(AttenChar {
            app_type: buf[0],
            sec_type: buf[1],
            source_address: mac_at(buf, 2),
            run_id: arr8_at(buf, 8),
            source_id: arr17_at(buf, 16),
            resp_id: arr17_at(buf, 33),
            num_sounds: buf[50],
            num_groups,
            aag: buf[52..end].to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttenCharRsp {
    pub app_type: u8,
    pub sec_type: u8,
    pub source_address: MacAddr,
    pub run_id: [u8; 8],
    pub source_id: [u8; 17],
    pub resp_id: [u8; 17],
    pub result: u8,
}

impl AttenCharRsp {
    pub const LEN: usize = 51;
    pub const RESULT_SUCCESS: u8 = 0x00;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.app_type);
        out.push(self.sec_type);
        out.extend_from_slice(self.source_address.as_bytes());
        out.extend_from_slice(&self.run_id);
        out.extend_from_slice(&self.source_id);
        out.extend_from_slice(&self.resp_id);
        out.push(self.result);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, Self::LEN)?;
        Ok(AttenCharRsp {
            app_type: buf[0],
            sec_type: buf[1],
            source_address: mac_at(buf, 2),
            run_id: arr8_at(buf, 8),
            source_id: arr17_at(buf, 16),
            resp_id: arr17_at(buf, 33),
            result: buf[50],
        })
    }
}

// ── CM_SLAC_MATCH ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchReq {
    pub app_type: u8,
    pub sec_type: u8,
    pub mvf_length: u16,
    pub pev_id: [u8; 17],
    pub pev_mac: MacAddr,
    pub evse_id: [u8; 17],
    pub evse_mac: MacAddr,
    pub run_id: [u8; 8],
    pub reserved: [u8; 8],
}

impl MatchReq {
    pub const LEN: usize = 66;
    pub const MVF_LENGTH: u16 = 0x003e;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.app_type);
        out.push(self.sec_type);
        // mvf_length is big-endian in the REQ.
        out.extend_from_slice(&self.mvf_length.to_be_bytes());
        out.extend_from_slice(&self.pev_id);
        out.extend_from_slice(self.pev_mac.as_bytes());
        out.extend_from_slice(&self.evse_id);
        out.extend_from_slice(self.evse_mac.as_bytes());
        out.extend_from_slice(&self.run_id);
        out.extend_from_slice(&self.reserved);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, Self::LEN)?;
        Ok(MatchReq {
            app_type: buf[0],
            sec_type: buf[1],
            mvf_length: u16::from_be_bytes([buf[2], buf[3]]),
            pev_id: arr17_at(buf, 4),
            pev_mac: mac_at(buf, 21),
            evse_id: arr17_at(buf, 27),
            evse_mac: mac_at(buf, 44),
            run_id: arr8_at(buf, 50),
            reserved: arr8_at(buf, 58),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCnf {
    pub app_type: u8,
    pub sec_type: u8,
    pub mvf_length: u16,
    pub pev_id: [u8; 17],
    pub pev_mac: MacAddr,
    pub evse_id: [u8; 17],
    pub evse_mac: MacAddr,
    pub run_id: [u8; 8],
    pub reserved_1: [u8; 8],
    pub nid: [u8; 7],
    pub reserved_2: u8,
    pub nmk: [u8; 16],
}

impl MatchCnf {
    pub const LEN: usize = 90;
    pub const MVF_LENGTH: u16 = 0x0056;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.app_type);
        out.push(self.sec_type);
        // mvf_length is little-endian in the CNF — the one field in this
        // message family that breaks from the big-endian default.
        out.extend_from_slice(&self.mvf_length.to_le_bytes());
        out.extend_from_slice(&self.pev_id);
        out.extend_from_slice(self.pev_mac.as_bytes());
        out.extend_from_slice(&self.evse_id);
        out.extend_from_slice(self.evse_mac.as_bytes());
        out.extend_from_slice(&self.run_id);
        out.extend_from_slice(&self.reserved_1);
        out.extend_from_slice(&self.nid);
        out.push(self.reserved_2);
        out.extend_from_slice(&self.nmk);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        need(buf, Self::LEN)?;
        let mut nid = [0u8; 7];
        nid.copy_from_slice(&buf[66..73]);
        let mut nmk = [0u8; 16];
        nmk.copy_from_slice(&buf[74..90]);
        Ok(MatchCnf {
            app_type: buf[0],
            sec_type: buf[1],
            mvf_length: u16::from_le_bytes([buf[2], buf[3]]),
            pev_id: arr17_at(buf, 4),
            pev_mac: mac_at(buf, 21),
            evse_id: arr17_at(buf, 27),
            evse_mac: mac_at(buf, 44),
            run_id: arr8_at(buf, 50),
            reserved_1: arr8_at(buf, 58),
            nid,
            reserved_2: buf[73],
            nmk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_key_req_round_trips_and_matches_s1() {
        let req = SetKeyReq {
            nid: [0x02, 0x6B, 0xCB, 0xA5, 0x35, 0x4E, 0x08],
            new_key: [
                0xB5, 0x93, 0x19, 0xD7, 0xE8, 0x15, 0x7B, 0xA0, 0x01, 0xB0, 0x18, 0x66, 0x9C,
                0xCE, 0xE3, 0x0D,
            ],
        };
        let encoded = req.encode();
        assert_eq!(encoded.len(), SetKeyReq::LEN);
        assert_eq!(encoded[0], 0x01); // key_type
        assert_eq!(&encoded[1..5], &[0xAA, 0xAA, 0xAA, 0xAA]);
        assert_eq!(SetKeyReq::decode(&encoded).unwrap(), req);
    }

    #[test]
    fn slac_parm_cnf_matches_scenario_s2() {
        let cnf = SlacParmCnf {
            msound_target: crate::mac::BROADCAST,
            num_sounds: 10,
            time_out: 6,
            resp_type: 0x01,
            forwarding_sta: MacAddr([0xbb; 6]),
            app_type: 0x00,
            sec_type: 0x00,
            run_id: [0xfa; 8],
        };
        let encoded = cnf.encode();
        assert_eq!(encoded.len(), SlacParmCnf::LEN);
        assert_eq!(SlacParmCnf::decode(&encoded).unwrap(), cnf);
    }

    #[test]
    fn atten_profile_round_trips_variable_length() {
        let profile = AttenProfile {
            pev_mac: MacAddr([0xbb; 6]),
            num_groups: 3,
            reserved: 0,
            aag: vec![20, 30, 10],
        };
        let encoded = profile.encode();
        assert_eq!(encoded.len(), 8 + 3);
        assert_eq!(AttenProfile::decode(&encoded).unwrap(), profile);
    }

    #[test]
    fn atten_char_round_trips_with_full_58_groups() {
        let atten = AttenChar {
            app_type: 0,
            sec_type: 0,
            source_address: MacAddr([0xbb; 6]),
            run_id: [0xfa; 8],
            source_id: [0; 17],
            resp_id: [0; 17],
            num_sounds: 3,
            num_groups: NUM_GROUPS as u8,
            aag: vec![7u8; NUM_GROUPS],
        };
        let encoded = atten.encode();
        assert_eq!(AttenChar::decode(&encoded).unwrap(), atten);
    }

    #[test]
    fn atten_char_rsp_result_success_is_zero() {
        assert_eq!(AttenCharRsp::RESULT_SUCCESS, 0x00);
    }

    #[test]
    fn match_req_mvf_length_is_big_endian() {
        let req = MatchReq {
            app_type: 0,
            sec_type: 0,
            mvf_length: MatchReq::MVF_LENGTH,
            pev_id: [0; 17],
            pev_mac: MacAddr([0xbb; 6]),
            evse_id: [0; 17],
            evse_mac: MacAddr([0xab; 6]),
            run_id: [0xfa; 8],
            reserved: [0; 8],
        };
        let encoded = req.encode();
        assert_eq!(&encoded[2..4], &[0x00, 0x3e]);
        assert_eq!(MatchReq::decode(&encoded).unwrap(), req);
    }

    #[test]
    fn match_cnf_mvf_length_is_little_endian() {
        let cnf = MatchCnf {
            app_type: 0,
            sec_type: 0,
            mvf_length: MatchCnf::MVF_LENGTH,
            pev_id: [0; 17],
            pev_mac: MacAddr([0xbb; 6]),
            evse_id: [0; 17],
            evse_mac: MacAddr([0xab; 6]),
            run_id: [0xfa; 8],
            reserved_1: [0; 8],
            nid: [0x02, 0x6B, 0xCB, 0xA5, 0x35, 0x4E, 0x08],
            reserved_2: 0,
            nmk: [0xAA; 16],
        };
        let encoded = cnf.encode();
        // scenario S6: mvf_length = 56 00 in little-endian wire order.
        assert_eq!(&encoded[2..4], &[0x56, 0x00]);
        assert_eq!(MatchCnf::decode(&encoded).unwrap(), cnf);
    }
}
