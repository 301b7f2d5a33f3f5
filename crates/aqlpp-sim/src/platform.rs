//! Simulated packet processor platform
//!
//! Implements every `aqlpp_core::hw` trait on top of mmap-backed device
//! memory, a register file and a host memory model. Doorbells take effect
//! immediately: a DMA doorbell copies the bytes, a completion doorbell
//! decrements the signal, a core doorbell records the launch. Each one then
//! raises its completion interrupt, which the processor picks up the next
//! time it services interrupts.
//!
//! The register file and memories sit behind a `RefCell`, so a platform is
//! single-threaded. Interrupts travel through a lock-free queue that an
//! [`InterruptLine`] can feed from any thread.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use aqlpp_core::error::{PpError, Result};
use aqlpp_core::hw::{
    DeviceMemory, Doorbell, Interrupt, InterruptControl, Mmio, QueueRing, SignalMemory, YieldPoint,
};
use aqlpp_core::layout::{config_space_size, core_regs, regs, DeviceLayout, DEVICE_MEMORY_BASE};
use aqlpp_core::ops::{DmaDirection, MASK_ENTRIES};
use aqlpp_core::packet::{
    BarrierPacket, KernelDispatchPacket, PacketHeader, RawPacket, SignalHandle, PACKET_SIZE,
};
use aqlpp_core::{kdebug, kerror, ktrace, kwarn};

use crate::host::HostMemory;
use crate::region::MmapRegion;

/// Pending interrupts the line can hold
const IRQ_CAPACITY: usize = 256;

/// Platform dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    pub queue_length: usize,
    pub cores: usize,
    /// Device memory after the queue bookkeeping words
    pub staging_bytes: usize,
    pub host_bytes: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self {
            queue_length: 128,
            cores: 1,
            staging_bytes: 1 << 20,
            host_bytes: 4 << 20,
        }
    }

    pub fn queue_length(mut self, n: usize) -> Self {
        self.queue_length = n;
        self
    }

    pub fn cores(mut self, n: usize) -> Self {
        self.cores = n;
        self
    }

    pub fn staging_bytes(mut self, n: usize) -> Self {
        self.staging_bytes = n;
        self
    }

    pub fn host_bytes(mut self, n: usize) -> Self {
        self.host_bytes = n;
        self
    }
}

/// Core registers captured when a core's doorbell rang
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub core: usize,
    pub task: u16,
    pub normalization: u16,
    pub threshold: u16,
    pub color_model: u8,
    pub border_handling: u8,
    pub width: u32,
    pub height: u32,
    pub src_address: u64,
    pub dst_address: u64,
    pub mask0: [i32; MASK_ENTRIES],
    pub mask1: [i32; MASK_ENTRIES],
}

/// Everything the simulated hardware did, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwEvent {
    Dma {
        direction: DmaDirection,
        host_address: u64,
        device_address: u64,
        bytes: u64,
        pasid: u32,
    },
    Launch(LaunchRecord),
    Decrement {
        signal: SignalHandle,
        pasid: u32,
        /// Value after the decrement
        value: i64,
    },
    TopologyAck(Doorbell),
    /// A doorbell the hardware could not carry out; no interrupt follows
    Fault(String),
}

#[derive(Debug, Clone, Copy)]
struct PendingIrq {
    irq: Interrupt,
    /// Latched into `RCV_INT` on delivery of `KernelDone`
    core: u64,
}

/// Thread-safe handle for raising interrupts on a [`SimPlatform`]
#[derive(Clone)]
pub struct InterruptLine {
    queue: Arc<ArrayQueue<PendingIrq>>,
}

impl InterruptLine {
    fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(IRQ_CAPACITY)),
        }
    }

    /// Raise `irq`. Returns false if the line is saturated.
    pub fn raise(&self, irq: Interrupt) -> bool {
        self.raise_for_core(irq, 0)
    }

    fn raise_for_core(&self, irq: Interrupt, core: u64) -> bool {
        let ok = self.queue.push(PendingIrq { irq, core }).is_ok();
        if !ok {
            kerror!("interrupt line saturated, {:?} lost", irq);
        }
        ok
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Hook run at every processor yield point
pub type YieldHook = Box<dyn FnMut(&mut SimState, YieldPoint, usize)>;

/// Mutable hardware state, reachable from yield hooks
pub struct SimState {
    layout: DeviceLayout,
    device: MmapRegion,
    registers: MmapRegion,
    host: HostMemory,
    queue_length: usize,
    cores: usize,
    /// Held cores finish only when released
    held: Vec<bool>,
    /// Launch finished on a held core, interrupt not yet raised
    parked: Vec<bool>,
    events: Vec<HwEvent>,
    irq_enabled: bool,
    line: InterruptLine,
}

impl SimState {
    #[inline]
    pub fn host(&self) -> &HostMemory {
        &self.host
    }

    #[inline]
    pub fn host_mut(&mut self) -> &mut HostMemory {
        &mut self.host
    }

    #[inline]
    pub fn events(&self) -> &[HwEvent] {
        &self.events
    }

    pub fn store_signal(&mut self, handle: SignalHandle, value: i64) -> Result<()> {
        self.host.store_signal(handle, value)
    }

    pub fn load_signal(&self, handle: SignalHandle) -> Result<i64> {
        self.host.load_signal(handle)
    }

    /// While held, launches on `core` do not complete
    pub fn hold_core(&mut self, core: usize, held: bool) {
        if let Some(h) = self.held.get_mut(core) {
            *h = held;
        }
    }

    /// Un-hold `core` and complete its parked launch, if any. Returns true
    /// when an interrupt was raised.
    pub fn release_core(&mut self, core: usize) -> bool {
        self.hold_core(core, false);
        match self.parked.get_mut(core) {
            Some(parked) if *parked => {
                *parked = false;
                self.line.raise_for_core(Interrupt::KernelDone, core as u64)
            }
            _ => false,
        }
    }

    /// Raise an interrupt, e.g. a topology change
    pub fn raise(&self, irq: Interrupt) -> bool {
        self.line.raise(irq)
    }

    /// Write `CPU_HALT`
    pub fn halt(&mut self) {
        self.set_reg(regs::CPU_HALT, &1u64.to_le_bytes());
    }

    fn reg(&self, offset: u64, width: usize) -> u64 {
        let mut b = [0u8; 8];
        match self.registers.read(offset, &mut b[..width]) {
            Ok(()) => u64::from_le_bytes(b),
            Err(_) => {
                kwarn!("register read outside config space: {:#x}", offset);
                0
            }
        }
    }

    fn set_reg(&mut self, offset: u64, bytes: &[u8]) {
        if self.registers.write(offset, bytes).is_err() {
            kwarn!("register write outside config space: {:#x}", offset);
        }
    }

    fn ring(&mut self, code: u64) {
        match Doorbell::decode(code, self.cores) {
            Some(Doorbell::DmaEngine) => self.run_dma(),
            Some(Doorbell::CompletionEngine) => self.run_decrement(),
            Some(Doorbell::Core(core)) => self.run_launch(core),
            Some(ack @ (Doorbell::CoreAddedAck | Doorbell::CoreRemovedAck)) => {
                ktrace!("sim: topology ack {:?}", ack);
                self.events.push(HwEvent::TopologyAck(ack));
            }
            None => self.fault(format!("unknown doorbell code {}", code)),
        }
    }

    fn run_dma(&mut self) {
        let host_address = self.reg(regs::DMA_HOST_ADDR, 8);
        let device_address = self.reg(regs::DMA_DEVICE_ADDR, 8);
        let bytes = self.reg(regs::DMA_PAYLOAD_SIZE, 8);
        let pasid = self.reg(regs::DMA_PASID, 4) as u32;
        let Some(direction) = DmaDirection::from_raw(self.reg(regs::DMA_LDST, 4) as u32) else {
            return self.fault("dma: bad direction".to_string());
        };

        if let Err(e) = self.copy(direction, host_address, device_address, bytes) {
            return self.fault(format!("dma {:?}: {}", direction, e));
        }
        kdebug!(
            "sim: dma {:?} host={:#x} device={:#x} bytes={}",
            direction,
            host_address,
            device_address,
            bytes
        );
        self.events.push(HwEvent::Dma {
            direction,
            host_address,
            device_address,
            bytes,
            pasid,
        });
        self.line.raise(Interrupt::DmaDone);
    }

    fn copy(&mut self, direction: DmaDirection, host: u64, device: u64, bytes: u64) -> Result<()> {
        let len = usize::try_from(bytes).map_err(|_| PpError::BadAddress(bytes))?;
        let dev_off = device
            .checked_sub(DEVICE_MEMORY_BASE)
            .ok_or(PpError::BadAddress(device))?;
        let mut buf = vec![0u8; len];
        match direction {
            DmaDirection::Load => {
                self.host.read(host, &mut buf)?;
                self.device.write(dev_off, &buf)
            }
            DmaDirection::Store => {
                self.device.read(dev_off, &mut buf)?;
                self.host.write(host, &buf)
            }
        }
    }

    fn run_decrement(&mut self) {
        let signal = SignalHandle(self.reg(regs::CMPL_SIG, 8));
        let pasid = self.reg(regs::CMPL_SIG_PASID, 4) as u32;
        match self.host.decrement_signal(signal) {
            Ok(value) => {
                kdebug!("sim: signal {:#x} -> {}", signal.0, value);
                self.events.push(HwEvent::Decrement { signal, pasid, value });
                self.line.raise(Interrupt::CompletionDone);
            }
            Err(e) => self.fault(format!("decrement {:#x}: {}", signal.0, e)),
        }
    }

    fn run_launch(&mut self, core: usize) {
        let at = |r: u64| core_regs::offset(core, r);
        let mut mask0 = [0i32; MASK_ENTRIES];
        let mut mask1 = [0i32; MASK_ENTRIES];
        for i in 0..MASK_ENTRIES {
            mask0[i] = self.reg(at(core_regs::MASK0 + 4 * i as u64), 4) as u32 as i32;
            mask1[i] = self.reg(at(core_regs::MASK1 + 4 * i as u64), 4) as u32 as i32;
        }
        let record = LaunchRecord {
            core,
            task: self.reg(at(core_regs::TASK), 2) as u16,
            normalization: self.reg(at(core_regs::NORMALIZATION), 2) as u16,
            threshold: self.reg(at(core_regs::THRESHOLD), 2) as u16,
            color_model: self.reg(at(core_regs::COLOR_MODEL), 1) as u8,
            border_handling: self.reg(at(core_regs::BORDER_HANDLING), 1) as u8,
            width: self.reg(at(core_regs::WIDTH), 4) as u32,
            height: self.reg(at(core_regs::HEIGHT), 4) as u32,
            src_address: self.reg(at(core_regs::SRC_ADDR), 8),
            dst_address: self.reg(at(core_regs::DST_ADDR), 8),
            mask0,
            mask1,
        };
        kdebug!("sim: core {} task {:#x}", core, record.task);
        self.events.push(HwEvent::Launch(record));

        if self.held[core] {
            self.parked[core] = true;
        } else {
            self.line.raise_for_core(Interrupt::KernelDone, core as u64);
        }
    }

    fn fault(&mut self, msg: String) {
        kerror!("sim: {}", msg);
        self.events.push(HwEvent::Fault(msg));
    }
}

pub struct SimPlatform {
    state: RefCell<SimState>,
    hook: RefCell<Option<YieldHook>>,
    yields: Cell<usize>,
}

impl SimPlatform {
    pub fn new(config: SimConfig) -> Result<Self> {
        if !config.queue_length.is_power_of_two() {
            return Err(PpError::Config("queue_length must be a power of two"));
        }
        if config.cores == 0 {
            return Err(PpError::Config("cores must be > 0"));
        }

        let layout = DeviceLayout::new(config.queue_length);
        let mut device = MmapRegion::new(layout.free_memory() as usize + config.staging_bytes)?;
        // ring slots start out invalid; zero would read as vendor-specific
        for i in 0..config.queue_length as u64 {
            device.write(
                layout.packet_ring() + i * PACKET_SIZE as u64,
                &PacketHeader::INVALID.raw().to_le_bytes(),
            )?;
        }

        let state = SimState {
            layout,
            device,
            registers: MmapRegion::new(config_space_size(config.cores) as usize)?,
            host: HostMemory::new(config.host_bytes)?,
            queue_length: config.queue_length,
            cores: config.cores,
            held: vec![false; config.cores],
            parked: vec![false; config.cores],
            events: Vec::new(),
            irq_enabled: true,
            line: InterruptLine::new(),
        };

        Ok(Self {
            state: RefCell::new(state),
            hook: RefCell::new(None),
            yields: Cell::new(0),
        })
    }

    /// Run `f` against the hardware state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    pub fn interrupt_line(&self) -> InterruptLine {
        self.state.borrow().line.clone()
    }

    /// Install `hook`, replacing any previous one
    pub fn set_yield_hook(&self, hook: impl FnMut(&mut SimState, YieldPoint, usize) + 'static) {
        *self.hook.borrow_mut() = Some(Box::new(hook));
    }

    pub fn clear_yield_hook(&self) {
        *self.hook.borrow_mut() = None;
    }

    /// Yield points passed so far
    pub fn yields(&self) -> usize {
        self.yields.get()
    }

    pub fn events(&self) -> Vec<HwEvent> {
        self.state.borrow().events.clone()
    }

    /// Number of recorded DMA transfers in `direction`
    pub fn dma_count(&self, direction: DmaDirection) -> usize {
        self.count(|e| matches!(e, HwEvent::Dma { direction: d, .. } if *d == direction))
    }

    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                HwEvent::Launch(l) => Some(l.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn decrement_count(&self) -> usize {
        self.count(|e| matches!(e, HwEvent::Decrement { .. }))
    }

    pub fn faults(&self) -> Vec<String> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                HwEvent::Fault(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&HwEvent) -> bool) -> usize {
        self.state.borrow().events.iter().filter(|e| pred(e)).count()
    }

    pub fn hold_core(&self, core: usize, held: bool) {
        self.with_state(|s| s.hold_core(core, held));
    }

    pub fn release_core(&self, core: usize) -> bool {
        self.with_state(|s| s.release_core(core))
    }

    /// Ask a running `Processor::run` to return
    pub fn halt(&self) {
        self.with_state(|s| s.halt());
    }

    // Host-side helpers

    pub fn alloc_host(&self, data: &[u8]) -> Result<u64> {
        self.with_state(|s| s.host.alloc_bytes(data))
    }

    pub fn read_host(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        self.state.borrow().host.read_vec(addr, len)
    }

    pub fn write_host(&self, addr: u64, data: &[u8]) -> Result<()> {
        self.with_state(|s| s.host.write(addr, data))
    }

    pub fn alloc_signal(&self, initial: i64) -> Result<SignalHandle> {
        self.with_state(|s| s.host.alloc_signal(initial))
    }

    pub fn store_signal(&self, handle: SignalHandle, value: i64) -> Result<()> {
        self.with_state(|s| s.host.store_signal(handle, value))
    }

    /// Header currently stored at ring position `ring_index`
    pub fn header_at(&self, ring_index: u64) -> Result<PacketHeader> {
        Ok(self.read_packet(ring_index)?.header())
    }

    /// Publish one entry the way the host runtime does: payload and PASID
    /// first, then the write index, then `AQL_LEFT`. Returns the packet id.
    pub fn submit(&self, packet: RawPacket, pasid: u32) -> Result<u64> {
        let write_index = self.write_index()?;
        if write_index - self.read_index()? >= self.queue_length() as u64 {
            return Err(PpError::QueueFull("packet ring"));
        }
        let layout = self.device_layout();
        let ring_index = write_index & (self.queue_length() as u64 - 1);

        self.write_device(
            DEVICE_MEMORY_BASE + layout.packet_ring() + ring_index * PACKET_SIZE as u64,
            packet.as_bytes(),
        )?;
        self.write_device(
            DEVICE_MEMORY_BASE + layout.pasid_array() + ring_index * 4,
            &pasid.to_le_bytes(),
        )?;
        self.write_device_u64(DEVICE_MEMORY_BASE + layout.write_index(), write_index + 1)?;
        self.write64(regs::AQL_LEFT, 1);
        ktrace!("sim: submitted packet {} at ring[{}]", write_index, ring_index);
        Ok(write_index)
    }

    pub fn submit_kernel(&self, packet: &KernelDispatchPacket, pasid: u32) -> Result<u64> {
        self.submit(packet.to_raw(), pasid)
    }

    pub fn submit_barrier(&self, packet: &BarrierPacket, pasid: u32) -> Result<u64> {
        self.submit(packet.to_raw(), pasid)
    }
}

impl DeviceMemory for SimPlatform {
    fn read_device(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let offset = addr
            .checked_sub(DEVICE_MEMORY_BASE)
            .ok_or(PpError::BadAddress(addr))?;
        self.state
            .borrow()
            .device
            .read(offset, buf)
            .map_err(|_| PpError::BadAddress(addr))
    }

    fn write_device(&self, addr: u64, data: &[u8]) -> Result<()> {
        let offset = addr
            .checked_sub(DEVICE_MEMORY_BASE)
            .ok_or(PpError::BadAddress(addr))?;
        self.state
            .borrow_mut()
            .device
            .write(offset, data)
            .map_err(|_| PpError::BadAddress(addr))
    }
}

impl QueueRing for SimPlatform {
    fn queue_length(&self) -> usize {
        self.state.borrow().queue_length
    }

    fn device_layout(&self) -> DeviceLayout {
        self.state.borrow().layout
    }
}

impl SignalMemory for SimPlatform {
    fn load_signal(&self, handle: SignalHandle) -> Result<i64> {
        self.state.borrow().host.load_signal(handle)
    }
}

impl Mmio for SimPlatform {
    fn write8(&self, offset: u64, value: u8) {
        self.state.borrow_mut().set_reg(offset, &[value]);
    }

    fn write16(&self, offset: u64, value: u16) {
        self.state.borrow_mut().set_reg(offset, &value.to_le_bytes());
    }

    fn write32(&self, offset: u64, value: u32) {
        self.state.borrow_mut().set_reg(offset, &value.to_le_bytes());
    }

    fn write64(&self, offset: u64, value: u64) {
        let mut state = self.state.borrow_mut();
        state.set_reg(offset, &value.to_le_bytes());
        if offset == regs::SND_INT {
            state.ring(value);
        }
    }

    fn read64(&self, offset: u64) -> u64 {
        self.state.borrow().reg(offset, 8)
    }
}

impl InterruptControl for SimPlatform {
    fn disable_interrupts(&self) -> bool {
        let mut state = self.state.borrow_mut();
        std::mem::replace(&mut state.irq_enabled, false)
    }

    fn enable_interrupts(&self) {
        self.state.borrow_mut().irq_enabled = true;
    }

    fn take_interrupt(&self) -> Option<Interrupt> {
        let mut state = self.state.borrow_mut();
        if !state.irq_enabled {
            return None;
        }
        let pending = state.line.queue.pop()?;
        if pending.irq == Interrupt::KernelDone {
            state.set_reg(regs::RCV_INT, &pending.core.to_le_bytes());
        }
        Some(pending.irq)
    }

    fn yield_now(&self, point: YieldPoint, spins: usize) {
        self.yields.set(self.yields.get() + 1);
        // taken out while it runs so the hook may not re-enter
        let hook = self.hook.borrow_mut().take();
        if let Some(mut hook) = hook {
            hook(&mut self.state.borrow_mut(), point, spins);
            let mut slot = self.hook.borrow_mut();
            if slot.is_none() {
                *slot = Some(hook);
            }
        }
    }
}
