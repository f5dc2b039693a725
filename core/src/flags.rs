//! NTLM negotiate flags.

use bitflags::bitflags;

bitflags! {
    /// Flag bits carried in the 32-bit flags field of every NTLM message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NegotiateFlags: u32 {
        /// Unicode (UTF-16LE) strings in security buffers.
        const NEGOTIATE_UNICODE = 1 << 0;
        /// OEM (8-bit) strings in security buffers.
        const NEGOTIATE_OEM = 1 << 1;
        /// Ask the server to include its realm in the Type2 message.
        const REQUEST_TARGET = 1 << 2;
        const NEGOTIATE_SIGN = 1 << 4;
        const NEGOTIATE_SEAL = 1 << 5;
        const NEGOTIATE_DATAGRAM_STYLE = 1 << 6;
        const NEGOTIATE_LM_KEY = 1 << 7;
        const NEGOTIATE_NETWARE = 1 << 8;
        const NEGOTIATE_NTLM_KEY = 1 << 9;
        const NEGOTIATE_ANONYMOUS = 1 << 11;
        const NEGOTIATE_DOMAIN_SUPPLIED = 1 << 12;
        const NEGOTIATE_WORKSTATION_SUPPLIED = 1 << 13;
        const NEGOTIATE_LOCAL_CALL = 1 << 14;
        const NEGOTIATE_ALWAYS_SIGN = 1 << 15;
        const TARGET_TYPE_DOMAIN = 1 << 16;
        const TARGET_TYPE_SERVER = 1 << 17;
        const TARGET_TYPE_SHARE = 1 << 18;
        /// Selects the v2 (LMv2/NTLMv2) response computation.
        const NEGOTIATE_NTLM2_KEY = 1 << 19;
        const REQUEST_INIT_RESPONSE = 1 << 20;
        const REQUEST_ACCEPT_RESPONSE = 1 << 21;
        const REQUEST_NON_NT_SESSION_KEY = 1 << 22;
        /// The Type2 message carries a target information block.
        const NEGOTIATE_TARGET_INFO = 1 << 23;
        const NEGOTIATE_128 = 1 << 29;
        const NEGOTIATE_KEY_EXCHANGE = 1 << 30;
        const NEGOTIATE_56 = 1 << 31;

        // Servers may set bits we do not name.
        const _ = !0;
    }
}

impl NegotiateFlags {
    /// Flags sent in every Type1 message.
    pub const TYPE1: NegotiateFlags = NegotiateFlags::NEGOTIATE_OEM
        .union(NegotiateFlags::REQUEST_TARGET)
        .union(NegotiateFlags::NEGOTIATE_NTLM_KEY)
        .union(NegotiateFlags::NEGOTIATE_NTLM2_KEY)
        .union(NegotiateFlags::NEGOTIATE_ALWAYS_SIGN);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type1_flag_set_matches_wire_value() {
        assert_eq!(NegotiateFlags::TYPE1.bits(), 0x0008_8206);
    }

    #[test]
    fn unknown_bits_survive_a_round_trip() {
        let flags = NegotiateFlags::from_bits_retain(0x0200_0001);
        assert!(flags.contains(NegotiateFlags::NEGOTIATE_UNICODE));
        assert_eq!(flags.bits(), 0x0200_0001);
    }
}
