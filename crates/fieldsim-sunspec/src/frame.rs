//! ---
//! fds_section: "05-networking-external-interfaces"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "SunSpec register map served over Modbus/TCP."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
//! Modbus/TCP framing: the MBAP header plus PDU.

use bytes::{Buf, BufMut, BytesMut};

/// Read Holding Registers.
pub const FN_READ_HOLDING_REGISTERS: u8 = 0x03;
/// Write Multiple Registers.
pub const FN_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

const MBAP_HEADER_LEN: usize = 7;

/// Modbus exception codes used by the outstation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code not served (01).
    IllegalFunction = 0x01,
    /// Register range touches an unmapped address (02).
    IllegalDataAddress = 0x02,
    /// Tag lookup or register codec failure (04).
    SlaveDeviceFailure = 0x04,
}

/// One inbound request ADU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Transaction identifier, echoed in the response.
    pub transaction_id: u16,
    /// Protocol identifier; 0 for Modbus.
    pub protocol_id: u16,
    /// Unit identifier, echoed in the response.
    pub unit_id: u8,
    /// Requested function code.
    pub function: u8,
    /// PDU payload after the function code.
    pub data: Vec<u8>,
}

impl RequestFrame {
    /// Try to parse one complete ADU from the front of `buf`, consuming it.
    ///
    /// Returns `None` while the buffer does not yet hold a whole frame.
    pub fn try_parse(buf: &mut BytesMut) -> Option<Self> {
        if buf.len() < MBAP_HEADER_LEN + 1 {
            return None;
        }

        // MBAP length counts the unit id, function code, and data.
        let length = usize::from(u16::from_be_bytes([buf[4], buf[5]]));
        if length < 2 || buf.len() < 6 + length {
            return None;
        }

        let mut frame = buf.split_to(6 + length);
        let transaction_id = frame.get_u16();
        let protocol_id = frame.get_u16();
        let _length = frame.get_u16();
        let unit_id = frame.get_u8();
        let function = frame.get_u8();

        Some(Self {
            transaction_id,
            protocol_id,
            unit_id,
            function,
            data: frame.to_vec(),
        })
    }

    /// Build the success response ADU echoing this request's identifiers.
    pub fn response(&self, payload: &[u8]) -> Vec<u8> {
        let mut bytes = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + payload.len());
        bytes.put_u16(self.transaction_id);
        bytes.put_u16(self.protocol_id);
        bytes.put_u16((2 + payload.len()) as u16);
        bytes.put_u8(self.unit_id);
        bytes.put_u8(self.function);
        bytes.put(payload);
        bytes.to_vec()
    }

    /// Build the exception response ADU: function code with the high bit
    /// set, followed by the exception code.
    pub fn exception(&self, code: ExceptionCode) -> Vec<u8> {
        let mut bytes = BytesMut::with_capacity(MBAP_HEADER_LEN + 2);
        bytes.put_u16(self.transaction_id);
        bytes.put_u16(self.protocol_id);
        bytes.put_u16(3);
        bytes.put_u8(self.unit_id);
        bytes.put_u8(self.function | 0x80);
        bytes.put_u8(code as u8);
        bytes.to_vec()
    }
}
