//! Decide whether a binary needs library identification at all.
//!
//! Only stripped ELF executables of a supported machine that are not packed are
//! worth probing. The ELF machine also selects the CPU namespace of the
//! signature store.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use goblin::elf::header::{EM_386, EM_68K, EM_ARM, EM_MIPS, EM_PPC, EM_SH, EM_X86_64};
use goblin::elf::section_header::SHT_SYMTAB;
use goblin::elf::Elf;
use serde::{Deserialize, Serialize};

/// Shannon entropy (bits per byte) at or above which a binary counts as packed.
pub const DEFAULT_ENTROPY_THRESHOLD: f64 = 7.2;

/// ELF machines identified by default: x86, MIPS, PowerPC, ARM, SuperH, x86-64.
pub const DEFAULT_ALLOWED_MACHINES: [u16; 6] = [EM_386, EM_MIPS, EM_PPC, EM_ARM, EM_SH, EM_X86_64];

/// Header facts read from an ELF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElfAttributes {
    /// 32 or 64.
    pub bits: u8,
    pub machine: u16,
    /// True when the file has no symbol table section.
    pub stripped: bool,
}

/// Signature store CPU namespace for an ELF machine.
pub fn cpu_for_machine(machine: u16) -> Option<&'static str> {
    match machine {
        EM_386 | EM_X86_64 => Some("pc"),
        EM_68K => Some("mc68k"),
        EM_MIPS => Some("mips"),
        EM_PPC => Some("ppc"),
        EM_ARM => Some("arm"),
        EM_SH => Some("sh3"),
        _ => None,
    }
}

/// Read ELF attributes; `None` when `bytes` is not an ELF file.
///
/// A header that parses but whose section table does not is reported as not
/// stripped, so such files are left alone.
pub fn read_elf_attributes(bytes: &[u8]) -> Option<ElfAttributes> {
    let header = Elf::parse_header(bytes).ok()?;
    let bits = if header.e_ident[goblin::elf::header::EI_CLASS] == goblin::elf::header::ELFCLASS64 {
        64
    } else {
        32
    };
    let stripped = match Elf::parse(bytes) {
        Ok(elf) => !elf.section_headers.iter().any(|sh| sh.sh_type == SHT_SYMTAB),
        Err(_) => false,
    };
    Some(ElfAttributes { bits, machine: header.e_machine, stripped })
}

/// Shannon entropy of `bytes` in bits per byte (0 for empty input).
pub fn shannon_entropy(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<u8, usize> = HashMap::new();
    for b in bytes {
        *counts.entry(*b).or_default() += 1;
    }
    let total = bytes.len() as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Which checks apply and with what limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriagePolicy {
    pub entropy_threshold: f64,
    pub allowed_machines: Vec<u16>,
    pub ignore_machine: bool,
    pub ignore_strip: bool,
    pub ignore_entropy: bool,
}

impl Default for TriagePolicy {
    fn default() -> Self {
        Self {
            entropy_threshold: DEFAULT_ENTROPY_THRESHOLD,
            allowed_machines: DEFAULT_ALLOWED_MACHINES.to_vec(),
            ignore_machine: false,
            ignore_strip: false,
            ignore_entropy: false,
        }
    }
}

impl TriagePolicy {
    /// Disable every check except "is an ELF file".
    pub fn ignore_all(mut self) -> Self {
        self.ignore_machine = true;
        self.ignore_strip = true;
        self.ignore_entropy = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotElf,
    UnsupportedMachine,
    HasSymbols,
    Packed,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NotElf => "not_elf",
            SkipReason::UnsupportedMachine => "unsupported_machine",
            SkipReason::HasSymbols => "has_symbols",
            SkipReason::Packed => "packed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Triage verdict for one binary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Triage {
    Identify { attributes: ElfAttributes, cpu: Option<String>, entropy: f64 },
    Skip { reason: SkipReason, attributes: Option<ElfAttributes>, entropy: f64 },
}

impl Triage {
    pub fn needs_identification(&self) -> bool {
        matches!(self, Triage::Identify { .. })
    }

    pub fn cpu(&self) -> Option<&str> {
        match self {
            Triage::Identify { cpu, .. } => cpu.as_deref(),
            Triage::Skip { .. } => None,
        }
    }
}

/// Triage in-memory file contents.
pub fn triage_bytes(bytes: &[u8], policy: &TriagePolicy) -> Triage {
    let entropy = shannon_entropy(bytes);
    let Some(attributes) = read_elf_attributes(bytes) else {
        return Triage::Skip { reason: SkipReason::NotElf, attributes: None, entropy };
    };
    let skip = |reason| Triage::Skip { reason, attributes: Some(attributes), entropy };

    if !policy.ignore_machine && !policy.allowed_machines.contains(&attributes.machine) {
        return skip(SkipReason::UnsupportedMachine);
    }
    if !policy.ignore_strip && !attributes.stripped {
        return skip(SkipReason::HasSymbols);
    }
    if !policy.ignore_entropy && entropy >= policy.entropy_threshold {
        return skip(SkipReason::Packed);
    }
    let cpu = cpu_for_machine(attributes.machine).map(str::to_string);
    Triage::Identify { attributes, cpu, entropy }
}

/// Triage the file at `path`.
pub fn triage_file(path: &Path, policy: &TriagePolicy) -> std::io::Result<Triage> {
    let bytes = fs::read(path)?;
    Ok(triage_bytes(&bytes, policy))
}
