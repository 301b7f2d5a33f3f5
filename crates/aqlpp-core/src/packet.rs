//! AQL queue entry formats
//!
//! Every entry in the packet ring is 64 bytes, little-endian. The processor
//! copies an entry out of the ring as raw bytes and decodes it into one of
//! the typed records below; the only field it ever writes back is the
//! header, which becomes `INVALID` when the entry retires.
//!
//! ```text
//! kernel dispatch                         barrier and / or
//! 0x00 header          u16                0x00 header          u16
//! 0x02 setup           u16 (dims: 0..1)   0x02 reserved        u16
//! 0x04 workgroup x,y,z u16 x3             0x04 reserved        u32
//! 0x0A reserved        u16                0x08 dep_signal[5]   u64 x5
//! 0x0C grid x,y,z      u32 x3             0x30 reserved        u64
//! 0x18 private seg     u32                0x38 completion      u64
//! 0x1C group seg       u32
//! 0x20 kernel_object   u64
//! 0x28 kernarg_address u64
//! 0x30 reserved        u64
//! 0x38 completion      u64
//! ```

use core::fmt;

/// Size of every queue entry in bytes
pub const PACKET_SIZE: usize = 64;

/// Header bit positions and widths
pub mod header_bits {
    pub const TYPE_SHIFT: u16 = 0;
    pub const TYPE_WIDTH: u16 = 8;
    pub const BARRIER_SHIFT: u16 = 8;
    pub const ACQUIRE_FENCE_SHIFT: u16 = 9;
    pub const RELEASE_FENCE_SHIFT: u16 = 11;
    pub const FENCE_WIDTH: u16 = 2;
}

/// Number of dimensions is held in the low bits of `setup`
pub const SETUP_DIMENSIONS_WIDTH: u16 = 2;

/// Dependency signal slots in a barrier packet
pub const BARRIER_DEPENDENCIES: usize = 5;

/// Packet type codes (header bits 0..7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    VendorSpecific = 0,
    Invalid = 1,
    KernelDispatch = 2,
    BarrierAnd = 3,
    AgentDispatch = 4,
    BarrierOr = 5,
}

impl PacketType {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PacketType::VendorSpecific),
            1 => Some(PacketType::Invalid),
            2 => Some(PacketType::KernelDispatch),
            3 => Some(PacketType::BarrierAnd),
            4 => Some(PacketType::AgentDispatch),
            5 => Some(PacketType::BarrierOr),
            _ => None,
        }
    }
}

/// Memory fence scope (header bits 9..10 acquire, 11..12 release)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FenceScope {
    None = 0,
    Agent = 1,
    System = 2,
}

impl FenceScope {
    pub const fn from_bits(v: u16) -> Option<Self> {
        match v {
            0 => Some(FenceScope::None),
            1 => Some(FenceScope::Agent),
            2 => Some(FenceScope::System),
            _ => None,
        }
    }
}

/// Packed 16-bit packet header
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PacketHeader(pub u16);

impl PacketHeader {
    /// Header written over retired entries
    pub const INVALID: PacketHeader = PacketHeader(PacketType::Invalid as u16);

    pub const fn new(
        packet_type: PacketType,
        barrier: bool,
        acquire: FenceScope,
        release: FenceScope,
    ) -> Self {
        use header_bits::*;
        let mut h = (packet_type as u16) << TYPE_SHIFT;
        h |= (barrier as u16) << BARRIER_SHIFT;
        h |= (acquire as u16) << ACQUIRE_FENCE_SHIFT;
        h |= (release as u16) << RELEASE_FENCE_SHIFT;
        PacketHeader(h)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Raw type code, including codes outside the known set
    #[inline]
    pub const fn type_code(self) -> u8 {
        ((self.0 >> header_bits::TYPE_SHIFT) & ((1 << header_bits::TYPE_WIDTH) - 1)) as u8
    }

    #[inline]
    pub const fn packet_type(self) -> Option<PacketType> {
        PacketType::from_u8(self.type_code())
    }

    /// Entry may not start until every earlier entry has retired
    #[inline]
    pub const fn barrier(self) -> bool {
        (self.0 >> header_bits::BARRIER_SHIFT) & 1 != 0
    }

    pub const fn acquire_scope(self) -> Option<FenceScope> {
        FenceScope::from_bits(self.fence_bits(header_bits::ACQUIRE_FENCE_SHIFT))
    }

    pub const fn release_scope(self) -> Option<FenceScope> {
        FenceScope::from_bits(self.fence_bits(header_bits::RELEASE_FENCE_SHIFT))
    }

    #[inline]
    const fn fence_bits(self, shift: u16) -> u16 {
        (self.0 >> shift) & ((1 << header_bits::FENCE_WIDTH) - 1)
    }
}

impl fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketHeader")
            .field("type", &self.type_code())
            .field("barrier", &self.barrier())
            .field("acquire", &self.acquire_scope())
            .field("release", &self.release_scope())
            .finish()
    }
}

/// Completion / dependency signal handle.
///
/// The handle is the address of a signed 64-bit counter. A null handle
/// means "no signal".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct SignalHandle(pub u64);

impl SignalHandle {
    pub const NULL: SignalHandle = SignalHandle(0);

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// One undecoded queue entry
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct RawPacket(pub [u8; PACKET_SIZE]);

impl RawPacket {
    pub const fn zeroed() -> Self {
        RawPacket([0; PACKET_SIZE])
    }

    #[inline]
    pub fn header(&self) -> PacketHeader {
        PacketHeader(self.u16_at(0))
    }

    pub fn set_header(&mut self, header: PacketHeader) {
        self.put_u16(0, header.raw());
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.0
    }

    /// Decode according to the header's type code
    pub fn decode(&self) -> Packet {
        let header = self.header();
        match header.packet_type() {
            Some(PacketType::VendorSpecific) => Packet::VendorSpecific(header),
            Some(PacketType::Invalid) => Packet::Invalid,
            Some(PacketType::KernelDispatch) => {
                Packet::KernelDispatch(KernelDispatchPacket::from_raw(self))
            }
            Some(PacketType::BarrierAnd) => Packet::BarrierAnd(BarrierPacket::from_raw(self)),
            Some(PacketType::AgentDispatch) => {
                Packet::AgentDispatch(AgentDispatchPacket::from_raw(self))
            }
            Some(PacketType::BarrierOr) => Packet::BarrierOr(BarrierPacket::from_raw(self)),
            None => Packet::Unknown(header.type_code()),
        }
    }

    #[inline]
    fn u16_at(&self, off: usize) -> u16 {
        u16::from_le_bytes([self.0[off], self.0[off + 1]])
    }

    #[inline]
    fn u32_at(&self, off: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.0[off..off + 4]);
        u32::from_le_bytes(b)
    }

    #[inline]
    fn u64_at(&self, off: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.0[off..off + 8]);
        u64::from_le_bytes(b)
    }

    #[inline]
    fn put_u16(&mut self, off: usize, v: u16) {
        self.0[off..off + 2].copy_from_slice(&v.to_le_bytes());
    }

    #[inline]
    fn put_u32(&mut self, off: usize, v: u32) {
        self.0[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }

    #[inline]
    fn put_u64(&mut self, off: usize, v: u64) {
        self.0[off..off + 8].copy_from_slice(&v.to_le_bytes());
    }
}

impl Default for RawPacket {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPacket({:?})", self.header())
    }
}

/// A decoded queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    VendorSpecific(PacketHeader),
    /// Slot not yet handed to the processor
    Invalid,
    KernelDispatch(KernelDispatchPacket),
    BarrierAnd(BarrierPacket),
    AgentDispatch(AgentDispatchPacket),
    BarrierOr(BarrierPacket),
    /// Type code outside the defined range
    Unknown(u8),
}

/// Kernel-dispatch entry: one filter invocation over one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelDispatchPacket {
    pub header: u16,
    pub setup: u16,
    pub workgroup_size: [u16; 3],
    /// Image width, height, depth
    pub grid_size: [u32; 3],
    pub private_segment_size: u32,
    pub group_segment_size: u32,
    /// Operation code, see [`crate::ops::Operation`]
    pub kernel_object: u64,
    /// Host address of the argument blob
    pub kernarg_address: u64,
    pub completion_signal: SignalHandle,
}

impl KernelDispatchPacket {
    pub fn from_raw(raw: &RawPacket) -> Self {
        Self {
            header: raw.u16_at(0x00),
            setup: raw.u16_at(0x02),
            workgroup_size: [raw.u16_at(0x04), raw.u16_at(0x06), raw.u16_at(0x08)],
            grid_size: [raw.u32_at(0x0C), raw.u32_at(0x10), raw.u32_at(0x14)],
            private_segment_size: raw.u32_at(0x18),
            group_segment_size: raw.u32_at(0x1C),
            kernel_object: raw.u64_at(0x20),
            kernarg_address: raw.u64_at(0x28),
            completion_signal: SignalHandle(raw.u64_at(0x38)),
        }
    }

    pub fn to_raw(&self) -> RawPacket {
        let mut raw = RawPacket::zeroed();
        raw.put_u16(0x00, self.header);
        raw.put_u16(0x02, self.setup);
        for (i, wg) in self.workgroup_size.iter().enumerate() {
            raw.put_u16(0x04 + 2 * i, *wg);
        }
        for (i, g) in self.grid_size.iter().enumerate() {
            raw.put_u32(0x0C + 4 * i, *g);
        }
        raw.put_u32(0x18, self.private_segment_size);
        raw.put_u32(0x1C, self.group_segment_size);
        raw.put_u64(0x20, self.kernel_object);
        raw.put_u64(0x28, self.kernarg_address);
        raw.put_u64(0x38, self.completion_signal.0);
        raw
    }

    #[inline]
    pub fn dimensions(&self) -> u16 {
        self.setup & ((1 << SETUP_DIMENSIONS_WIDTH) - 1)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.grid_size[0]
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.grid_size[1]
    }
}

/// Barrier-AND / barrier-OR entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BarrierPacket {
    pub header: u16,
    pub dep_signals: [SignalHandle; BARRIER_DEPENDENCIES],
    pub completion_signal: SignalHandle,
}

impl BarrierPacket {
    pub fn from_raw(raw: &RawPacket) -> Self {
        let mut dep_signals = [SignalHandle::NULL; BARRIER_DEPENDENCIES];
        for (i, dep) in dep_signals.iter_mut().enumerate() {
            *dep = SignalHandle(raw.u64_at(0x08 + 8 * i));
        }
        Self {
            header: raw.u16_at(0x00),
            dep_signals,
            completion_signal: SignalHandle(raw.u64_at(0x38)),
        }
    }

    pub fn to_raw(&self) -> RawPacket {
        let mut raw = RawPacket::zeroed();
        raw.put_u16(0x00, self.header);
        for (i, dep) in self.dep_signals.iter().enumerate() {
            raw.put_u64(0x08 + 8 * i, dep.0);
        }
        raw.put_u64(0x38, self.completion_signal.0);
        raw
    }

    /// Non-null dependency handles, in slot order
    pub fn active_dependencies(&self) -> impl Iterator<Item = SignalHandle> + '_ {
        self.dep_signals.iter().copied().filter(|s| !s.is_null())
    }
}

/// Agent-dispatch entry. Accepted and dropped by this processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AgentDispatchPacket {
    pub header: u16,
    pub agent_type: u16,
    pub return_address: u64,
    pub args: [u64; 4],
    pub completion_signal: SignalHandle,
}

impl AgentDispatchPacket {
    pub fn from_raw(raw: &RawPacket) -> Self {
        Self {
            header: raw.u16_at(0x00),
            agent_type: raw.u16_at(0x02),
            return_address: raw.u64_at(0x08),
            args: [
                raw.u64_at(0x10),
                raw.u64_at(0x18),
                raw.u64_at(0x20),
                raw.u64_at(0x28),
            ],
            completion_signal: SignalHandle(raw.u64_at(0x38)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bits() {
        let h = PacketHeader::new(
            PacketType::KernelDispatch,
            true,
            FenceScope::System,
            FenceScope::Agent,
        );
        // type 2 | barrier bit 8 | acquire 2 << 9 | release 1 << 11
        assert_eq!(h.raw(), 0x0002 | 0x0100 | 0x0400 | 0x0800);
        assert_eq!(h.packet_type(), Some(PacketType::KernelDispatch));
        assert!(h.barrier());
        assert_eq!(h.acquire_scope(), Some(FenceScope::System));
        assert_eq!(h.release_scope(), Some(FenceScope::Agent));
    }

    #[test]
    fn test_unknown_type() {
        let mut raw = RawPacket::zeroed();
        raw.set_header(PacketHeader(0x0009));
        assert_eq!(raw.decode(), Packet::Unknown(9));
        assert_eq!(PacketHeader(0x0003 << 9).acquire_scope(), None);
    }

    #[test]
    fn test_invalid_header() {
        assert_eq!(PacketHeader::INVALID.raw(), 1);
        let mut raw = RawPacket::zeroed();
        raw.set_header(PacketHeader::INVALID);
        assert_eq!(raw.decode(), Packet::Invalid);
    }

    #[test]
    fn test_kernel_dispatch_offsets() {
        let kp = KernelDispatchPacket {
            header: PacketHeader::new(
                PacketType::KernelDispatch,
                false,
                FenceScope::System,
                FenceScope::System,
            )
            .raw(),
            setup: 2,
            grid_size: [20, 30, 1],
            kernel_object: 0x03,
            kernarg_address: 0x1122_3344_5566_7788,
            completion_signal: SignalHandle(0xABCD),
            ..Default::default()
        };
        let raw = kp.to_raw();
        let bytes = raw.as_bytes();
        assert_eq!(&bytes[0x0C..0x10], &20u32.to_le_bytes());
        assert_eq!(&bytes[0x10..0x14], &30u32.to_le_bytes());
        assert_eq!(bytes[0x20], 0x03);
        assert_eq!(&bytes[0x28..0x30], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&bytes[0x38..0x40], &0xABCDu64.to_le_bytes());

        match raw.decode() {
            Packet::KernelDispatch(decoded) => {
                assert_eq!(decoded.width(), 20);
                assert_eq!(decoded.height(), 30);
                assert_eq!(decoded.dimensions(), 2);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_barrier_active_dependencies() {
        let bp = BarrierPacket {
            header: PacketType::BarrierAnd as u16,
            dep_signals: [
                SignalHandle(0x100),
                SignalHandle::NULL,
                SignalHandle(0x108),
                SignalHandle::NULL,
                SignalHandle::NULL,
            ],
            completion_signal: SignalHandle::NULL,
        };
        let raw = bp.to_raw();
        assert_eq!(&raw.as_bytes()[0x18..0x20], &0x108u64.to_le_bytes());
        let deps: Vec<_> = BarrierPacket::from_raw(&raw).active_dependencies().collect();
        assert_eq!(deps, vec![SignalHandle(0x100), SignalHandle(0x108)]);
    }

    #[test]
    fn test_packet_size() {
        assert_eq!(core::mem::size_of::<RawPacket>(), PACKET_SIZE);
    }
}
