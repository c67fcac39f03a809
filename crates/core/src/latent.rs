//! Latent tensor container.
//!
//! Latents travel between worker and client in the safetensors layout:
//!
//! ```text
//! [u64 LE header length N][N bytes JSON header][raw tensor data]
//! ```
//!
//! The header maps each entry name to `{dtype, shape, data_offsets}`, with
//! offsets relative to the start of the data section. Only `F32` entries
//! are produced and accepted, which is what the sampler emits.
//!
//! A container destined for the node-graph loader carries two entries: the
//! latent itself under [`LATENT_TENSOR_KEY`] and an empty
//! [`FORMAT_VERSION_KEY`] marker. Without the marker the loader applies its
//! own legacy 0.18215 scaling on top of ours.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::CoreError;

/// Entry holding the generated latent.
pub const LATENT_TENSOR_KEY: &str = "latent_tensor";

/// Empty marker entry the downstream loader looks for.
pub const FORMAT_VERSION_KEY: &str = "latent_format_version_0";

/// VAE scaling factor of the SDXL model family.
pub const SDXL_VAE_SCALING: f32 = 0.13025;

/// Default factor applied to raw sampler output before packaging.
///
/// The downstream VAE decoder expects latents already divided by the VAE
/// scaling factor, while the sampler emits them unscaled.
pub const DEFAULT_LATENT_SCALE: f32 = 1.0 / SDXL_VAE_SCALING;

const DTYPE_F32: &str = "F32";
const HEADER_LEN_BYTES: usize = 8;
const METADATA_KEY: &str = "__metadata__";

/// A dense row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Build a tensor, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, CoreError> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(CoreError::Format(format!(
                "shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Zero-length 1-D tensor, used for marker entries.
    pub fn empty() -> Self {
        Self {
            shape: vec![0],
            data: Vec::new(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Multiply every element by `factor`.
    pub fn scaled(mut self, factor: f32) -> Self {
        for v in &mut self.data {
            *v *= factor;
        }
        self
    }
}

/// Number of elements `shape` describes, or `Format` if it overflows `usize`.
fn element_count(shape: &[usize]) -> Result<usize, CoreError> {
    shape
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or_else(|| CoreError::Format(format!("shape {shape:?} overflows")))
}

#[derive(Debug, Deserialize)]
struct EntryInfo {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// Named collection of tensors serialized in the safetensors layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatentContainer {
    entries: BTreeMap<String, Tensor>,
}

impl LatentContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Container with `latent` under [`LATENT_TENSOR_KEY`] plus the
    /// [`FORMAT_VERSION_KEY`] marker.
    pub fn for_latent(latent: Tensor) -> Self {
        let mut container = Self::new();
        container.insert(FORMAT_VERSION_KEY, Tensor::empty());
        container.insert(LATENT_TENSOR_KEY, latent);
        container
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.entries.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries.get(name)
    }

    /// Remove and return the entry `name`, failing if it is absent.
    pub fn take(&mut self, name: &str) -> Result<Tensor, CoreError> {
        self.entries
            .remove(name)
            .ok_or_else(|| CoreError::Format(format!("entry '{name}' not found")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Serialize to the on-disk byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = serde_json::Map::new();
        let mut offset = 0usize;
        for (name, tensor) in &self.entries {
            let len = tensor.data.len() * std::mem::size_of::<f32>();
            header.insert(
                name.clone(),
                serde_json::json!({
                    "dtype": DTYPE_F32,
                    "shape": tensor.shape,
                    "data_offsets": [offset, offset + len],
                }),
            );
            offset += len;
        }

        let mut header_bytes = serde_json::Value::Object(header).to_string().into_bytes();
        // Data section starts 8-byte aligned; pad with spaces as JSON allows.
        while (HEADER_LEN_BYTES + header_bytes.len()) % 8 != 0 {
            header_bytes.push(b' ');
        }

        let mut out = Vec::with_capacity(HEADER_LEN_BYTES + header_bytes.len() + offset);
        out.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&header_bytes);
        for tensor in self.entries.values() {
            for v in &tensor.data {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    /// Parse the on-disk byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() < HEADER_LEN_BYTES {
            return Err(CoreError::Format("file shorter than header length".into()));
        }
        let mut len_bytes = [0u8; HEADER_LEN_BYTES];
        len_bytes.copy_from_slice(&bytes[..HEADER_LEN_BYTES]);
        let header_len = u64::from_le_bytes(len_bytes) as usize;

        let data_start = HEADER_LEN_BYTES
            .checked_add(header_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| CoreError::Format(format!("header length {header_len} out of range")))?;

        let header: BTreeMap<String, serde_json::Value> =
            serde_json::from_slice(&bytes[HEADER_LEN_BYTES..data_start])
                .map_err(|e| CoreError::Format(format!("malformed header: {e}")))?;
        let data = &bytes[data_start..];

        let mut container = Self::new();
        for (name, raw) in header {
            if name == METADATA_KEY {
                continue;
            }
            let info: EntryInfo = serde_json::from_value(raw)
                .map_err(|e| CoreError::Format(format!("entry '{name}': {e}")))?;
            container.insert(name.clone(), decode_entry(&name, &info, data)?);
        }
        Ok(container)
    }
}

fn decode_entry(name: &str, info: &EntryInfo, data: &[u8]) -> Result<Tensor, CoreError> {
    if info.dtype != DTYPE_F32 {
        return Err(CoreError::Format(format!(
            "entry '{name}' has unsupported dtype {}",
            info.dtype
        )));
    }
    let [start, end] = info.data_offsets;
    if start > end || end > data.len() {
        return Err(CoreError::Format(format!(
            "entry '{name}' offsets [{start}, {end}] exceed data section of {} bytes",
            data.len()
        )));
    }
    let raw = &data[start..end];
    let expected_bytes = element_count(&info.shape)?
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(|| CoreError::Format(format!("entry '{name}' shape overflows")))?;
    if raw.len() != expected_bytes {
        return Err(CoreError::Format(format!(
            "entry '{name}' shape {:?} needs {expected_bytes} bytes, got {}",
            info.shape,
            raw.len()
        )));
    }
    let values = raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Tensor::new(info.shape.clone(), values)
}
