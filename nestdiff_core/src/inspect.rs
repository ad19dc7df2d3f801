use nestdiff_common::{InspectOptions, ToolConfig};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

const NATIVE_OBJECT_EXTENSIONS: &[&str] = &[".so", ".a", ".o"];

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const EM_AARCH64: u16 = 0xb7;

/// Whether a path names a native shared library, archive or object file
pub fn is_native_object(path: &str) -> bool {
    NATIVE_OBJECT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Machine architecture recorded in an ELF header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfMachine {
    Aarch64,
    Other(u16),
}

/// Read the `e_machine` field of an ELF file, if it is one
pub fn elf_machine(path: &Path) -> Option<ElfMachine> {
    let mut header = [0u8; 20];
    File::open(path).ok()?.read_exact(&mut header).ok()?;
    if header[..4] != ELF_MAGIC {
        return None;
    }

    let raw = match header[5] {
        2 => u16::from_be_bytes([header[18], header[19]]),
        _ => u16::from_le_bytes([header[18], header[19]]),
    };
    Some(if raw == EM_AARCH64 {
        ElfMachine::Aarch64
    } else {
        ElfMachine::Other(raw)
    })
}

/// Dumps symbols, headers or disassembly of native objects with external tools
#[derive(Debug, Clone)]
pub struct BinaryInspector {
    options: InspectOptions,
    tools: ToolConfig,
}

impl BinaryInspector {
    pub fn new(options: InspectOptions, tools: ToolConfig) -> Self {
        Self { options, tools }
    }

    /// Whether `path` would produce any output
    pub fn applies_to(&self, path: &str) -> bool {
        self.options.any() && is_native_object(path)
    }

    /// Concatenated output of every enabled inspection. Missing or failing
    /// tools contribute nothing.
    pub fn inspect(&self, file: &Path) -> Vec<String> {
        let mut lines = Vec::new();

        if self.options.nm {
            lines.extend(run_tool(&self.tools.nm, &["-gDCU"], file));
        }
        if self.options.objdump {
            lines.extend(run_tool(&self.tools.objdump, &["-x"], file));
        }
        if self.options.disassemble {
            let program = match elf_machine(file) {
                Some(ElfMachine::Aarch64) => &self.tools.aarch64_objdump,
                _ => &self.tools.objdump,
            };
            lines.extend(run_tool(program, &["-D", "-j", ".text"], file));
        }

        lines
    }
}

fn run_tool(program: &str, args: &[&str], file: &Path) -> Vec<String> {
    let Ok(resolved) = which::which(program) else {
        warn!("{} not found; skipping inspection of {}", program, file.display());
        return Vec::new();
    };

    debug!("$ {} {} {}", program, args.join(" "), file.display());
    let output = match Command::new(resolved).args(args).arg(file).output() {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to run {}: {}", program, e);
            return Vec::new();
        }
    };
    if !output.status.success() {
        debug!("{} exited with {} for {}", program, output.status, file.display());
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}
