use crate::error::ParseError;
use crate::mac::MacAddr;

/// Ether type reserved for HomePlug Green PHY management messages.
pub const ETH_P_HPAV: u16 = 0x88e1;

/// `dst_mac[6] | src_mac[6] | ether_type[2, big-endian]` — 14 bytes, always
/// the first thing on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ether_type: u16,
}

impl EthernetHeader {
    pub const LEN: usize = 14;

    pub fn hpgp(dst: MacAddr, src: MacAddr) -> Self {
        EthernetHeader { dst, src, ether_type: ETH_P_HPAV }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.dst.as_bytes());
        out.extend_from_slice(self.src.as_bytes());
        out.extend_from_slice(&self.ether_type.to_be_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < Self::LEN {
            return Err(ParseError::TooShort { got: buf.len(), need: Self::LEN });
        }
        let dst = MacAddr::from_slice(&buf[0..6]).expect("slice length checked above");
        let src = MacAddr::from_slice(&buf[6..12]).expect("slice length checked above");
        let ether_type = u16::from_be_bytes([buf[12], buf[13]]);
        if ether_type != ETH_P_HPAV {
            return Err(ParseError::WrongEtherType { got: ether_type, want: ETH_P_HPAV });
        }
        Ok(EthernetHeader { dst, src, ether_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let hdr = EthernetHeader::hpgp(
            MacAddr([0x00, 0xb0, 0x52, 0x00, 0x00, 0x01]),
            MacAddr([0xab; 6]),
        );
        let mut buf = Vec::new();
        hdr.encode(&mut buf);
        assert_eq!(buf.len(), EthernetHeader::LEN);
        assert_eq!(EthernetHeader::decode(&buf).unwrap(), hdr);
    }

    #[test]
    fn rejects_wrong_ether_type() {
        let mut buf = vec![0u8; 14];
        buf[12] = 0x08;
        buf[13] = 0x00; // 0x0800, IPv4, not HPAV
        assert_eq!(
            EthernetHeader::decode(&buf),
            Err(ParseError::WrongEtherType { got: 0x0800, want: ETH_P_HPAV })
        );
    }

    #[test]
    fn rejects_short_buffer() {
        let buf = vec![0u8; 10];
        assert_eq!(
            EthernetHeader::decode(&buf),
            Err(ParseError::TooShort { got: 10, need: 14 })
        );
    }
}
