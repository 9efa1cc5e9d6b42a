use crate::DagError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use strum::IntoEnumIterator;

/// Where a transported value should land on the receiving side.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Keep the placement chosen by the sender.
    Default,
    Cpu,
    Gpu,
    Cuda,
}

impl Device {
    pub fn parse(device: &str) -> Result<Self, DagError> {
        Device::from_str(device).map_err(|_| DagError::InvalidDevice {
            device: device.to_string(),
            valid: Device::iter()
                .map(|d| format!("'{d}'"))
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Gpu | Device::Cuda)
    }
}

/// Transport literals accepted by `with_tensor_transport`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum TransportKind {
    Auto,
    Accelerator,
    /// Legacy spelling of `Accelerator`.
    Nccl,
    Shm,
}

/// A caller-supplied communicator used for accelerator transfers.
pub trait Communicator: Send + Sync + Debug {
    fn name(&self) -> &str;
}

/// The `transport` argument: a literal or a custom communicator.
#[derive(Clone, Debug)]
pub enum TransportArg {
    Named(String),
    Communicator(Arc<dyn Communicator>),
}

impl From<&str> for TransportArg {
    fn from(value: &str) -> Self {
        TransportArg::Named(value.to_string())
    }
}

impl From<String> for TransportArg {
    fn from(value: String) -> Self {
        TransportArg::Named(value)
    }
}

impl From<Arc<dyn Communicator>> for TransportArg {
    fn from(value: Arc<dyn Communicator>) -> Self {
        TransportArg::Communicator(value)
    }
}

/// Concrete data path for tensors.
#[derive(Clone, Debug)]
pub enum TensorTransport {
    Accelerator,
    SharedMemory,
    Custom(Arc<dyn Communicator>),
}

impl PartialEq for TensorTransport {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TensorTransport::Accelerator, TensorTransport::Accelerator) => true,
            (TensorTransport::SharedMemory, TensorTransport::SharedMemory) => true,
            (TensorTransport::Custom(a), TensorTransport::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AutoTransportType {
    pub device: Device,
    pub static_shape: bool,
    pub direct_return: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TensorTransportType {
    pub transport: TensorTransport,
    pub device: Device,
    pub static_shape: bool,
    pub direct_return: bool,
}

/// How a node's output is moved to its consumers.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum ChannelOutputType {
    /// Ordinary serialized values, no tensor transport requested.
    #[default]
    Default,
    /// Placeholder, concretized by the compiler.
    Auto(AutoTransportType),
    Tensor(TensorTransportType),
}

impl ChannelOutputType {
    /// Build the annotation requested through `with_tensor_transport`.
    pub fn from_request(
        transport: TransportArg,
        device: &str,
        static_shape: bool,
        direct_return: bool,
    ) -> Result<Self, DagError> {
        let device = Device::parse(device)?;
        let transport = match transport {
            TransportArg::Named(name) => {
                let kind = TransportKind::from_str(&name)
                    .map_err(|_| DagError::InvalidTransport(name.clone()))?;
                match kind {
                    TransportKind::Auto => {
                        return Ok(ChannelOutputType::Auto(AutoTransportType {
                            device,
                            static_shape,
                            direct_return,
                        }));
                    }
                    TransportKind::Accelerator | TransportKind::Nccl => {
                        TensorTransport::Accelerator
                    }
                    TransportKind::Shm => TensorTransport::SharedMemory,
                }
            }
            TransportArg::Communicator(c) => TensorTransport::Custom(c),
        };
        Ok(ChannelOutputType::Tensor(TensorTransportType {
            transport,
            device,
            static_shape,
            direct_return,
        }))
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, ChannelOutputType::Auto(_))
    }

    pub fn device(&self) -> Device {
        match self {
            ChannelOutputType::Default => Device::Default,
            ChannelOutputType::Auto(x) => x.device,
            ChannelOutputType::Tensor(x) => x.device,
        }
    }

    pub fn requires_accelerator_communicator(&self) -> bool {
        matches!(
            self,
            ChannelOutputType::Tensor(TensorTransportType {
                transport: TensorTransport::Accelerator | TensorTransport::Custom(_),
                ..
            })
        )
    }
}
