//! embedded-datalog - DMA Sector Channel
//!
//! Two directional transfer channels move whole sectors between memory and
//! the serial bus without per-byte CPU involvement. The channel lifecycle
//! is `Idle -> Loaded -> Running -> Idle`; reloading a descriptor requires
//! the channel to be back in `Idle`, and the consuming-state transitions
//! make a reload-while-enabled impossible to express.
//!
//! Completion is a polled transfer-count-reached condition, not an
//! interrupt, in this design.

use core::marker::PhantomData;

use crate::sector::Sector;

/// An all-ones sector, loaded outbound while a read is in progress purely
/// to keep the bus clock running (the card only shifts data out while the
/// master generates clock edges).
pub const FILLER: [u8; Sector::LEN] = [0xFF; Sector::LEN];

/// Operations common to both channel directions.
pub trait ChannelPeriph {
    /// Start the transfer described by the loaded descriptor.
    fn enable(&mut self);

    /// Transfer-count-reached condition.
    fn transfer_complete(&self) -> bool;

    /// Stop the channel. Required before the descriptor may be reloaded.
    fn disable(&mut self);
}

/// The memory-to-bus direction.
pub trait TxPeriph: ChannelPeriph {
    /// Reload the descriptor: stage one sector of outbound data.
    fn load(&mut self, data: &[u8; Sector::LEN]);
}

/// The bus-to-memory direction. The engine owns its receive buffer, so a
/// completed transfer is copied out with [`take`](RxPeriph::take).
pub trait RxPeriph: ChannelPeriph {
    /// Reload the descriptor: arm the receive buffer for one sector.
    fn arm(&mut self);

    /// Copy the received sector out of the channel buffer.
    fn take(&mut self, dest: &mut [u8; Sector::LEN]);
}

/// Channel state: descriptor consumed or never loaded; safe to reload.
pub struct Idle;

/// Channel state: descriptor loaded but the transfer not yet started.
pub struct Loaded;

/// Channel state: transfer in progress (or finished but not disabled).
pub struct Running;

/// One directional transfer channel, with its lifecycle tracked in the
/// type system.
pub struct Channel<P, S> {
    periph: P,
    _state: PhantomData<S>,
}

impl<P> Channel<P, Idle> {
    /// Wrap a raw channel engine. The engine must be disabled.
    pub fn new(periph: P) -> Self {
        Channel {
            periph,
            _state: PhantomData,
        }
    }

    /// Release the raw channel engine.
    pub fn free(self) -> P {
        self.periph
    }
}

fn transition<P, A, B>(ch: Channel<P, A>) -> Channel<P, B> {
    Channel {
        periph: ch.periph,
        _state: PhantomData,
    }
}

impl<P: TxPeriph> Channel<P, Idle> {
    /// Reload the descriptor with one sector of outbound data.
    pub fn load(mut self, data: &[u8; Sector::LEN]) -> Channel<P, Loaded> {
        self.periph.load(data);
        transition(self)
    }
}

impl<P: RxPeriph> Channel<P, Idle> {
    /// Arm the receive descriptor for one inbound sector.
    pub fn arm(mut self) -> Channel<P, Loaded> {
        self.periph.arm();
        transition(self)
    }

    /// Copy the most recently received sector out of the channel buffer.
    pub fn take(&mut self, dest: &mut [u8; Sector::LEN]) {
        self.periph.take(dest)
    }
}

impl<P: ChannelPeriph> Channel<P, Loaded> {
    /// Start the transfer.
    pub fn enable(mut self) -> Channel<P, Running> {
        self.periph.enable();
        transition(self)
    }

    /// Abandon a descriptor that was never enabled.
    pub fn unload(self) -> Channel<P, Idle> {
        transition(self)
    }
}

impl<P: ChannelPeriph> Channel<P, Running> {
    /// Poll the transfer-count-reached condition.
    pub fn is_complete(&self) -> bool {
        self.periph.transfer_complete()
    }

    /// Stop the channel. The descriptor may be reloaded afterwards.
    pub fn disable(mut self) -> Channel<P, Idle> {
        self.periph.disable();
        transition(self)
    }
}
