//! ---
//! fds_section: "05-networking-external-interfaces"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "SunSpec register map served over Modbus/TCP."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::collections::HashMap;

use anyhow::{bail, Result as AnyResult};
use bytes::{BufMut, BytesMut};
use fieldsim_common::config::RegisterConfig;
use fieldsim_memory::TagMemory;

use crate::{RegisterError, Result};

/// SunSpec register data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunSpecType {
    /// Signed 16-bit, scaled.
    Int16,
    /// Unsigned 16-bit, scaled.
    Uint16,
    /// 16-bit accumulator, scaled.
    Acc16,
    /// 16-bit bitfield, unscaled.
    Bitfield16,
    /// 16-bit enumeration, unscaled.
    Enum16,
    /// Scale-factor register, unscaled.
    Sunssf,
    /// Signed 32-bit, scaled.
    Int32,
    /// Unsigned 32-bit, scaled.
    Uint32,
    /// 32-bit accumulator, scaled.
    Acc32,
    /// 32-bit bitfield, unscaled.
    Bitfield32,
    /// 32-bit enumeration, unscaled.
    Enum32,
    /// IEEE-754 single, unscaled.
    Float32,
    /// 64-bit accumulator, scaled.
    Acc64,
    /// 16-byte zero-padded string.
    String8,
    /// 32-byte zero-padded string.
    String16,
}

impl SunSpecType {
    /// Parse a config type name.
    pub fn parse(name: &str) -> Option<Self> {
        let ty = match name {
            "int16" => Self::Int16,
            "uint16" => Self::Uint16,
            "acc16" => Self::Acc16,
            "bitfield16" => Self::Bitfield16,
            "enum16" => Self::Enum16,
            "sunssf" => Self::Sunssf,
            "int32" => Self::Int32,
            "uint32" => Self::Uint32,
            "acc32" => Self::Acc32,
            "bitfield32" => Self::Bitfield32,
            "enum32" => Self::Enum32,
            "float32" => Self::Float32,
            "acc64" => Self::Acc64,
            "string8" => Self::String8,
            "string16" => Self::String16,
            _ => return None,
        };
        Some(ty)
    }

    /// Canonical type name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Acc16 => "acc16",
            Self::Bitfield16 => "bitfield16",
            Self::Enum16 => "enum16",
            Self::Sunssf => "sunssf",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Acc32 => "acc32",
            Self::Bitfield32 => "bitfield32",
            Self::Enum32 => "enum32",
            Self::Float32 => "float32",
            Self::Acc64 => "acc64",
            Self::String8 => "string8",
            Self::String16 => "string16",
        }
    }

    /// Width in 16-bit registers.
    pub fn length(self) -> u16 {
        match self {
            Self::Int16
            | Self::Uint16
            | Self::Acc16
            | Self::Bitfield16
            | Self::Enum16
            | Self::Sunssf => 1,
            Self::Int32
            | Self::Uint32
            | Self::Acc32
            | Self::Bitfield32
            | Self::Enum32
            | Self::Float32 => 2,
            Self::Acc64 => 4,
            Self::String8 => 8,
            Self::String16 => 16,
        }
    }

    /// True for the string types, which read from the string store.
    pub fn is_string(self) -> bool {
        matches!(self, Self::String8 | Self::String16)
    }

    fn scale_factor(self, scaling: i32) -> f64 {
        match self {
            // Scaling applies to the accumulator and integer families only.
            Self::Int16 | Self::Int32 | Self::Uint16 | Self::Uint32 | Self::Acc16 | Self::Acc32
            | Self::Acc64 => 10f64.powi(scaling),
            _ => 1.0,
        }
    }

    /// Encode a float into this type's big-endian register bytes.
    pub fn encode_number(self, value: f64, scaling: i32) -> Result<Vec<u8>> {
        let scaled = value * 10f64.powi(-scaling);
        let mut buf = BytesMut::with_capacity(usize::from(self.length()) * 2);

        match self {
            Self::Uint16 | Self::Acc16 => buf.put_u16(scaled as u16),
            Self::Uint32 | Self::Acc32 => buf.put_u32(scaled as u32),
            Self::Acc64 => buf.put_u64(scaled as u64),
            Self::Int16 => buf.put_i16(scaled as i16),
            Self::Int32 => buf.put_i32(scaled as i32),
            Self::Bitfield16 | Self::Enum16 => buf.put_u16(value as u16),
            Self::Bitfield32 | Self::Enum32 => buf.put_u32(value as u32),
            Self::Float32 => buf.put_f32(value as f32),
            Self::Sunssf => buf.put_i16(value as i16),
            Self::String8 | Self::String16 => {
                return Err(RegisterError::Encoding(self.name(), "number"))
            }
        }

        Ok(buf.to_vec())
    }

    /// Encode text into this type's zero-padded register bytes.
    pub fn encode_string(self, text: &str) -> Result<Vec<u8>> {
        if !self.is_string() {
            return Err(RegisterError::Encoding(self.name(), "string"));
        }

        let width = usize::from(self.length()) * 2;
        let mut bytes = vec![0u8; width];
        let raw = text.as_bytes();
        let n = raw.len().min(width);
        bytes[..n].copy_from_slice(&raw[..n]);
        Ok(bytes)
    }

    /// Decode big-endian register bytes into a float, applying scaling.
    pub fn decode(self, data: &[u8], scaling: i32) -> Result<f64> {
        let width = usize::from(self.length()) * 2;
        let Some(data) = data.get(..width) else {
            return Err(RegisterError::Decoding(self.name()));
        };

        let raw = match self {
            Self::Uint16 | Self::Acc16 => f64::from(u16::from_be_bytes([data[0], data[1]])),
            Self::Bitfield16 | Self::Enum16 => f64::from(u16::from_be_bytes([data[0], data[1]])),
            Self::Int16 | Self::Sunssf => f64::from(i16::from_be_bytes([data[0], data[1]])),
            Self::Uint32 | Self::Acc32 => {
                f64::from(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
            }
            Self::Bitfield32 | Self::Enum32 => {
                f64::from(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
            }
            Self::Int32 => f64::from(i32::from_be_bytes([data[0], data[1], data[2], data[3]])),
            Self::Float32 => {
                f64::from(f32::from_be_bytes([data[0], data[1], data[2], data[3]]))
            }
            Self::Acc64 => u64::from_be_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ]) as f64,
            Self::String8 | Self::String16 => {
                return Err(RegisterError::Decoding(self.name()));
            }
        };

        Ok(raw * self.scale_factor(scaling))
    }
}

/// The immutable register map of one outstation.
#[derive(Debug, Default)]
pub struct RegisterBank {
    registers: HashMap<u16, String>,
    scalings: HashMap<u16, i32>,
    types: HashMap<String, SunSpecType>,
}

impl RegisterBank {
    /// Build the bank from config entries, checking each mapped tag exists.
    pub fn from_config(entries: &[RegisterConfig], memory: &TagMemory) -> AnyResult<Self> {
        let mut bank = Self::default();

        for entry in entries {
            let Some(ty) = SunSpecType::parse(&entry.kind) else {
                bail!("unknown SunSpec type '{}' at register {}", entry.kind, entry.address);
            };
            if !memory.has_tag(&entry.tag) {
                bail!("tag {} does not exist", entry.tag);
            }

            bank.registers.insert(entry.address, entry.tag.clone());
            bank.scalings.insert(entry.address, entry.scaling_factor);
            bank.types.insert(entry.tag.clone(), ty);
        }

        Ok(bank)
    }

    /// Tag mapped at an address.
    pub fn tag(&self, address: u16) -> Result<&str> {
        self.registers
            .get(&address)
            .map(String::as_str)
            .ok_or(RegisterError::Unmapped(address))
    }

    /// Scaling exponent for an address; unmapped addresses scale by 0.
    pub fn scaling(&self, address: u16) -> i32 {
        self.scalings.get(&address).copied().unwrap_or(0)
    }

    /// Type of a mapped tag.
    pub fn kind(&self, tag: &str) -> SunSpecType {
        // Every tag in `registers` was inserted into `types` alongside it.
        self.types[tag]
    }
}
