//! Camera family constants and the register address table.
//!
//! The family is chosen once when the engine is initialized. It fixes the
//! contrast offset used by texture classification, the slope width used to
//! convert rotations into register units, the physical register addresses
//! and the byte layout of register frames.

/// Image width that identifies the VM camera family.
pub const VM_IMAGE_WIDTH: usize = 752;

/// Opcode of a register write frame.
pub const OPCODE_WRITE: u8 = 0xF0;
/// Opcode of a register read request.
pub const OPCODE_READ: u8 = 0xF1;

/// Stereo camera hardware family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraFamily {
    /// 752-pixel-wide sensors.
    Vm,
    /// 1280-pixel-wide sensors and everything else.
    Xc,
}

/// Logical correction registers, independent of the physical address map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalRegister {
    /// Rotation applied to the reference image.
    ReferenceRotation,
    /// Horizontal shift applied to the reference image.
    ReferenceHorizontalShift,
    /// Vertical shift applied to the reference image.
    ReferenceVerticalShift,
    /// Rotation applied to the comparison image.
    ComparisonRotation,
    /// Horizontal shift applied to the comparison image.
    ComparisonHorizontalShift,
    /// Vertical shift applied to the comparison image.
    ComparisonVerticalShift,
    /// Persisted vertical base position.
    BaseVertical,
    /// Persisted rotation base position.
    BaseRotation,
    /// EEPROM commit control/status register.
    EepromControl,
}

impl LogicalRegister {
    /// All logical registers in table order.
    pub const ALL: [LogicalRegister; 9] = [
        LogicalRegister::ReferenceRotation,
        LogicalRegister::ReferenceHorizontalShift,
        LogicalRegister::ReferenceVerticalShift,
        LogicalRegister::ComparisonRotation,
        LogicalRegister::ComparisonHorizontalShift,
        LogicalRegister::ComparisonVerticalShift,
        LogicalRegister::BaseVertical,
        LogicalRegister::BaseRotation,
        LogicalRegister::EepromControl,
    ];

    fn table_index(self) -> usize {
        match self {
            LogicalRegister::ReferenceRotation => 0,
            LogicalRegister::ReferenceHorizontalShift => 1,
            LogicalRegister::ReferenceVerticalShift => 2,
            LogicalRegister::ComparisonRotation => 3,
            LogicalRegister::ComparisonHorizontalShift => 4,
            LogicalRegister::ComparisonVerticalShift => 5,
            LogicalRegister::BaseVertical => 6,
            LogicalRegister::BaseRotation => 7,
            LogicalRegister::EepromControl => 8,
        }
    }

    /// Short name used in log events.
    pub fn name(self) -> &'static str {
        match self {
            LogicalRegister::ReferenceRotation => "ref_rotation",
            LogicalRegister::ReferenceHorizontalShift => "ref_hshift",
            LogicalRegister::ReferenceVerticalShift => "ref_vshift",
            LogicalRegister::ComparisonRotation => "cmp_rotation",
            LogicalRegister::ComparisonHorizontalShift => "cmp_hshift",
            LogicalRegister::ComparisonVerticalShift => "cmp_vshift",
            LogicalRegister::BaseVertical => "base_vertical",
            LogicalRegister::BaseRotation => "base_rotation",
            LogicalRegister::EepromControl => "eeprom",
        }
    }
}

const VM_ADDRESSES: [u16; 9] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x21, 0x22, 0x0080];
const XC_ADDRESSES: [u16; 9] = [0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x61, 0x62, 0x00F0];

/// Byte lengths of the register frames for a family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    /// Length of a write frame.
    pub write_len: usize,
    /// Length of a read request frame.
    pub read_request_len: usize,
    /// Length of the read response buffer.
    pub read_response_len: usize,
}

/// Offset of the big-endian value inside a read response.
pub const RESPONSE_VALUE_OFFSET: usize = 6;

impl CameraFamily {
    /// Selects the family from the configured image width.
    pub fn from_image_width(width: usize) -> Self {
        if width == VM_IMAGE_WIDTH {
            CameraFamily::Vm
        } else {
            CameraFamily::Xc
        }
    }

    /// Offset subtracted from the scaled brightness range before normalizing contrast.
    pub fn contrast_offset(self) -> i32 {
        match self {
            CameraFamily::Vm => 1800,
            CameraFamily::Xc => 1200,
        }
    }

    /// Horizontal lever arm (pixels) used to convert a rotation into register units.
    pub fn rotation_slope_width(self) -> i32 {
        match self {
            CameraFamily::Vm => 376,
            CameraFamily::Xc => 256,
        }
    }

    /// Physical address of a logical register.
    pub fn address(self, register: LogicalRegister) -> u16 {
        let table = match self {
            CameraFamily::Vm => &VM_ADDRESSES,
            CameraFamily::Xc => &XC_ADDRESSES,
        };
        table[register.table_index()]
    }

    /// Frame lengths used on the wire.
    pub fn frame_layout(self) -> FrameLayout {
        match self {
            CameraFamily::Vm => FrameLayout {
                write_len: 5,
                read_request_len: 3,
                read_response_len: 16,
            },
            CameraFamily::Xc => FrameLayout {
                write_len: 8,
                read_request_len: 8,
                read_response_len: 8,
            },
        }
    }

    /// Encodes a write frame: opcode, big-endian address, big-endian value, zero padding.
    pub fn encode_write(self, register: LogicalRegister, value: u16) -> Vec<u8> {
        let addr = self.address(register);
        let mut frame = vec![0u8; self.frame_layout().write_len];
        frame[0] = OPCODE_WRITE;
        frame[1..3].copy_from_slice(&addr.to_be_bytes());
        frame[3..5].copy_from_slice(&value.to_be_bytes());
        frame
    }

    /// Encodes a read request: opcode and big-endian address, zero padding.
    pub fn encode_read(self, register: LogicalRegister) -> Vec<u8> {
        let addr = self.address(register);
        let mut frame = vec![0u8; self.frame_layout().read_request_len];
        frame[0] = OPCODE_READ;
        frame[1..3].copy_from_slice(&addr.to_be_bytes());
        frame
    }

    /// Decodes the register value from a read response.
    pub fn decode_read(response: &[u8]) -> Option<u16> {
        let bytes = response.get(RESPONSE_VALUE_OFFSET..RESPONSE_VALUE_OFFSET + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}
