//! Top-level frame assembly: Ethernet header + HomePlug header + payload,
//! zero-padded to the 60-byte Ethernet minimum on send, dispatched by
//! `(mm_type, kind)` on receive.

use crate::error::ParseError;
use crate::ethernet::EthernetHeader;
use crate::homeplug::{HomePlugHeader, MmBase, MmKind};
use crate::mac::MacAddr;
use crate::messages::{
    AttenChar, AttenCharRsp, AttenProfile, MatchCnf, MatchReq, MnbcSound, SetKeyCnf, SetKeyReq,
    SlacParmCnf, SlacParmReq, StartAttenChar,
};

/// Minimum Ethernet frame size; shorter payloads are zero-padded up to this
/// on send. Nothing on the receive side relies on padding being present.
pub const MIN_FRAME_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SetKeyReq(SetKeyReq),
    SetKeyCnf(SetKeyCnf),
    SlacParmReq(SlacParmReq),
    SlacParmCnf(SlacParmCnf),
    StartAttenChar(StartAttenChar),
    MnbcSound(MnbcSound),
    AttenProfile(AttenProfile),
    AttenChar(AttenChar),
    AttenCharRsp(AttenCharRsp),
    MatchReq(MatchReq),
    MatchCnf(MatchCnf),
}

impl Message {
    fn payload(&self) -> Vec<u8> {
        match self {
            Message::SetKeyReq(m) => m.encode(),
            Message::SetKeyCnf(m) => m.encode(),
            Message::SlacParmReq(m) => m.encode(),
            Message::SlacParmCnf(m) => m.encode(),
            Message::StartAttenChar(m) => m.encode(),
            Message::MnbcSound(m) => m.encode(),
            Message::AttenProfile(m) => m.encode(),
            Message::AttenChar(m) => m.encode(),
            Message::AttenCharRsp(m) => m.encode(),
            Message::MatchReq(m) => m.encode(),
            Message::MatchCnf(m) => m.encode(),
        }
    }

    fn base_and_kind(&self) -> (MmBase, MmKind) {
        match self {
            Message::SetKeyReq(_) => (MmBase::SetKey, MmKind::Req),
            Message::SetKeyCnf(_) => (MmBase::SetKey, MmKind::Cnf),
            Message::SlacParmReq(_) => (MmBase::SlacParm, MmKind::Req),
            Message::SlacParmCnf(_) => (MmBase::SlacParm, MmKind::Cnf),
            Message::StartAttenChar(_) => (MmBase::StartAttenChar, MmKind::Ind),
            Message::MnbcSound(_) => (MmBase::MnbcSound, MmKind::Ind),
            Message::AttenProfile(_) => (MmBase::AttenProfile, MmKind::Ind),
            Message::AttenChar(_) => (MmBase::AttenChar, MmKind::Ind),
            Message::AttenCharRsp(_) => (MmBase::AttenChar, MmKind::Rsp),
            Message::MatchReq(_) => (MmBase::SlacMatch, MmKind::Req),
            Message::MatchCnf(_) => (MmBase::SlacMatch, MmKind::Cnf),
        }
    }
}

/// Assemble dst/src MACs, a HomePlug header built from `msg`'s own kind, and
/// `msg`'s encoded payload into one wire frame, zero-padded to
/// [`MIN_FRAME_LEN`].
pub fn encode_frame(dst: MacAddr, src: MacAddr, msg: &Message) -> Vec<u8> {
    let (base, kind) = msg.base_and_kind();
    let eth = EthernetHeader::hpgp(dst, src);
    let hp = HomePlugHeader::new(base, kind);
    let mut out = Vec::with_capacity(MIN_FRAME_LEN);
    eth.encode(&mut out);
    hp.encode(&mut out);
    out.extend_from_slice(&msg.payload());
    if out.len() < MIN_FRAME_LEN {
        out.resize(MIN_FRAME_LEN, 0);
    }
    out
}

/// Parse a received frame into its headers and dispatched payload. A
/// `(mm_type, kind)` combination this crate never sends or expects to
/// receive (e.g. a lone CM_ATTEN_CHAR.CNF) is reported as `UnknownMmType`
/// even though the header itself decoded — there's no payload shape to
/// dispatch it to.
pub fn parse_frame(buf: &[u8]) -> Result<(EthernetHeader, HomePlugHeader, Message), ParseError> {
    let eth = EthernetHeader::decode(buf)?;
    let hp = HomePlugHeader::decode(&buf[EthernetHeader::LEN..])?;
    let payload = &buf[EthernetHeader::LEN + HomePlugHeader::LEN..];
    let mm_type_bits = (hp.base as u16) | (hp.kind as u16);

    let msg = match (hp.base, hp.kind) {
        (MmBase::SetKey, MmKind::Req) => Message::SetKeyReq(SetKeyReq::decode(payload)?),
        (MmBase::SetKey, MmKind::Cnf) => Message::SetKeyCnf(SetKeyCnf::decode(payload)?),
        (MmBase::SlacParm, MmKind::Req) => Message::SlacParmReq(SlacParmReq::decode(payload)?),
        (MmBase::SlacParm, MmKind::Cnf) => Message::SlacParmCnf(SlacParmCnf::decode(payload)?),
        (MmBase::StartAttenChar, MmKind::Ind) => {
            Message::StartAttenChar(StartAttenChar::decode(payload)?)
        }
        (MmBase::MnbcSound, MmKind::Ind) => Message::MnbcSound(MnbcSound::decode(payload)?),
        (MmBase::AttenProfile, MmKind::Ind) => {
            Message::AttenProfile(AttenProfile::decode(payload)?)
        }
        (MmBase::AttenChar, MmKind::Ind) => Message::AttenChar(AttenChar::decode(payload)?),
        (MmBase::AttenChar, MmKind::Rsp) => Message::AttenCharRsp(AttenCharRsp::decode(payload)?),
        (MmBase::SlacMatch, MmKind::Req) => Message::MatchReq(MatchReq::decode(payload)?),
        (MmBase::SlacMatch, MmKind::Cnf) => Message::MatchCnf(MatchCnf::decode(payload)?),
        _ => return Err(ParseError::UnknownMmType(mm_type_bits)),
    };

    Ok((eth, hp, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::{ATHEROS_CHIP_PEER, BROADCAST};
    use crate::messages::SlacParmReq;

    #[test]
    fn short_frame_is_padded_to_60_bytes() {
        let msg = Message::SlacParmReq(SlacParmReq { app_type: 0, sec_type: 0, run_id: [1; 8] });
        let frame = encode_frame(BROADCAST, ATHEROS_CHIP_PEER, &msg);
        assert_eq!(frame.len(), MIN_FRAME_LEN);
    }

    #[test]
    fn large_frame_is_not_truncated() {
        let msg = Message::AttenChar(AttenChar {
            app_type: 0,
            sec_type: 0,
            source_address: MacAddr([0xbb; 6]),
            run_id: [0xfa; 8],
            source_id: [0; 17],
            resp_id: [0; 17],
            num_sounds: 5,
            num_groups: crate::messages::NUM_GROUPS as u8,
            aag: vec![9u8; crate::messages::NUM_GROUPS],
        });
        let frame = encode_frame(BROADCAST, ATHEROS_CHIP_PEER, &msg);
        // 14 (eth) + 5 (hp) + 52 + 58 (aag) = 129, well over the 60 min.
        assert_eq!(frame.len(), 129);
    }

    #[test]
    fn round_trips_through_encode_and_parse() {
        let msg = Message::SlacParmReq(SlacParmReq { app_type: 0, sec_type: 0, run_id: [7; 8] });
        let frame = encode_frame(BROADCAST, ATHEROS_CHIP_PEER, &msg);
        let (eth, hp, decoded) = parse_frame(&frame).unwrap();
        assert_eq!(eth.dst, BROADCAST);
        assert_eq!(eth.src, ATHEROS_CHIP_PEER);
        assert_eq!(hp.base, MmBase::SlacParm);
        assert_eq!(hp.kind, MmKind::Req);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn match_req_and_match_cnf_have_different_total_sizes() {
        let req = Message::MatchReq(MatchReq {
            app_type: 0,
            sec_type: 0,
            mvf_length: MatchReq::MVF_LENGTH,
            pev_id: [0; 17],
            pev_mac: MacAddr([0xbb; 6]),
            evse_id: [0; 17],
            evse_mac: MacAddr([0xab; 6]),
            run_id: [0xfa; 8],
            reserved: [0; 8],
        });
        let cnf = Message::MatchCnf(MatchCnf {
            app_type: 0,
            sec_type: 0,
            mvf_length: MatchCnf::MVF_LENGTH,
            pev_id: [0; 17],
            pev_mac: MacAddr([0xbb; 6]),
            evse_id: [0; 17],
            evse_mac: MacAddr([0xab; 6]),
            run_id: [0xfa; 8],
            reserved_1: [0; 8],
            nid: [2, 0x6b, 0xcb, 0xa5, 0x35, 0x4e, 0x08],
            reserved_2: 0,
            nmk: [0xAA; 16],
        });
        assert_eq!(encode_frame(BROADCAST, ATHEROS_CHIP_PEER, &req).len(), 85);
        assert_eq!(encode_frame(BROADCAST, ATHEROS_CHIP_PEER, &cnf).len(), 109);
    }

    #[test]
    fn rejects_unpaired_mm_type() {
        let eth = EthernetHeader::hpgp(BROADCAST, ATHEROS_CHIP_PEER);
        let hp = HomePlugHeader::new(MmBase::AttenChar, MmKind::Cnf);
        let mut buf = Vec::new();
        eth.encode(&mut buf);
        hp.encode(&mut buf);
        buf.resize(MIN_FRAME_LEN, 0);
        assert!(matches!(parse_frame(&buf), Err(ParseError::UnknownMmType(_))));
    }
}
