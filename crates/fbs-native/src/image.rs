//! Native image loading.
//!
//! Metadata records method entry points as RVAs. The image maps them to virtual addresses (RVA +
//! relative address base) and serves the bytes behind a virtual address for decoding. Call targets
//! produced by the decoders are virtual addresses too, so everything downstream compares VAs.

use anyhow::{anyhow, bail, Context, Result};
use object::{Architecture, BinaryFormat, Object, ObjectSection, SectionKind};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::instruction::{Arch, CallingConvention};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Pe,
    Elf,
    MachO,
    /// Flat code blob loaded at an explicit base address.
    Raw,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageFormat::Pe => "pe",
            ImageFormat::Elf => "elf",
            ImageFormat::MachO => "macho",
            ImageFormat::Raw => "raw",
        };
        f.write_str(s)
    }
}

/// File-backed byte range mapped at a virtual address.
#[derive(Debug, Clone)]
struct MappedRange {
    name: String,
    address: u64,
    file_offset: u64,
    size: u64,
    executable: bool,
}

impl MappedRange {
    fn contains(&self, va: u64) -> bool {
        va >= self.address && va - self.address < self.size
    }
}

/// A loaded native image (e.g. `GameAssembly.dll` or `libil2cpp.so`).
pub struct NativeImage {
    data: Vec<u8>,
    format: ImageFormat,
    arch: Arch,
    convention: CallingConvention,
    base: u64,
    ranges: Vec<MappedRange>,
}

impl NativeImage {
    /// Read and parse an object file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read native image {}", path.display()))?;
        Self::parse(data).with_context(|| format!("Failed to parse native image {}", path.display()))
    }

    /// Load a raw code blob mapped at `base`.
    pub fn load_raw<P: AsRef<Path>>(path: P, base: u64, arch: Arch) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read raw image {}", path.display()))?;
        Ok(Self::raw(data, base, arch))
    }

    /// Parse an object file already in memory.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let (format, arch, base, ranges) = {
            let file = object::File::parse(&*data).map_err(|e| anyhow!("unrecognized object file: {}", e))?;

            let arch = match file.architecture() {
                Architecture::X86_64 => Arch::X86_64,
                Architecture::Aarch64 => Arch::Aarch64,
                other => bail!("unsupported architecture {:?}", other),
            };
            let format = match file.format() {
                BinaryFormat::Pe => ImageFormat::Pe,
                BinaryFormat::Elf => ImageFormat::Elf,
                BinaryFormat::MachO => ImageFormat::MachO,
                other => bail!("unsupported binary format {:?}", other),
            };

            let ranges: Vec<MappedRange> = file
                .sections()
                .filter_map(|section| {
                    let (file_offset, size) = section.file_range()?;
                    Some(MappedRange {
                        name: section.name().unwrap_or_default().to_string(),
                        address: section.address(),
                        file_offset,
                        size,
                        executable: section.kind() == SectionKind::Text,
                    })
                })
                .collect();

            (format, arch, file.relative_address_base(), ranges)
        };

        if ranges.is_empty() {
            bail!("image has no file-backed sections");
        }
        debug!(
            %format,
            %arch,
            base = format_args!("{:#x}", base),
            sections = ranges.len(),
            "loaded native image"
        );

        Ok(Self {
            data,
            format,
            arch,
            convention: CallingConvention::default_for(arch, format == ImageFormat::Pe),
            base,
            ranges,
        })
    }

    /// Treat `data` as code mapped contiguously at `base`.
    pub fn raw(data: Vec<u8>, base: u64, arch: Arch) -> Self {
        let size = data.len() as u64;
        Self {
            data,
            format: ImageFormat::Raw,
            arch,
            convention: CallingConvention::default_for(arch, false),
            base,
            ranges: vec![MappedRange {
                name: "raw".to_string(),
                address: base,
                file_offset: 0,
                size,
                executable: true,
            }],
        }
    }

    /// Override the calling convention picked from the image format.
    pub fn with_convention(mut self, convention: CallingConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    /// Relative address base (image base for PE, 0 for most ELF shared objects).
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn va_of(&self, rva: u64) -> u64 {
        self.base.wrapping_add(rva)
    }

    /// Bytes starting at `va`, at most `max_len` long and never crossing the containing section.
    pub fn code_at(&self, va: u64, max_len: usize) -> Option<&[u8]> {
        let range = self.ranges.iter().find(|r| r.contains(va))?;
        if !range.executable {
            debug!(
                va = format_args!("{:#x}", va),
                section = %range.name,
                "address is in a non-text section"
            );
        }
        let offset_in_section = va - range.address;
        let start = usize::try_from(range.file_offset + offset_in_section).ok()?;
        let available = usize::try_from(range.size - offset_in_section).ok()?;
        let end = start.checked_add(available.min(max_len))?;
        self.data.get(start..end.min(self.data.len()))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// SHA-256 of the image bytes, lowercase hex.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.data))
    }
}
