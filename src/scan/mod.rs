pub mod decoder;
pub mod device;
pub mod session;

pub use decoder::{ChannelDecoder, DecodeEvent, Decoder, DecoderFeed};
pub use device::{DeviceLease, DeviceSlot};
pub use session::{ScanReport, ScanSession};
