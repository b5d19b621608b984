//! Static opcode table.
//!
//! Every control operation the emulator understands has exactly one 16-bit
//! opcode. The values are part of the wire contract: they are never renumbered
//! and a retired value is never reused for a different meaning.

use crate::error::ProtocolError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Functional grouping of opcodes, used for display and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Snapshot,
    Jit,
    Execution,
    Tooling,
    Graphics,
    RestorePoint,
    Logging,
    System,
    Disc,
    Scripting,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Snapshot => "snapshot",
            Category::Jit => "jit",
            Category::Execution => "execution",
            Category::Tooling => "tooling",
            Category::Graphics => "graphics",
            Category::RestorePoint => "restore_point",
            Category::Logging => "logging",
            Category::System => "system",
            Category::Disc => "disc",
            Category::Scripting => "scripting",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! opcode_table {
    ($(
        $(#[$meta:meta])*
        $variant:ident = $code:literal, $name:literal, $snake:literal, $category:ident, $desc:literal;
    )+) => {
        /// Control operation identifier carried in the first two bytes of a frame.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Opcode {
            $(
                $(#[$meta])*
                $variant = $code,
            )+
        }

        impl Opcode {
            /// Every opcode, in ascending wire order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant),+];

            /// Returns the wire value.
            pub const fn code(self) -> u16 {
                self as u16
            }

            /// Resolves a wire value. Returns `None` for reserved or unknown values.
            pub const fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Opcode::$variant),)+
                    _ => None,
                }
            }

            /// Canonical operation name, e.g. `Snapshot_Save`.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name,)+
                }
            }

            /// Lower snake-case name, e.g. `snapshot_save`.
            pub const fn snake_name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $snake,)+
                }
            }

            pub const fn category(self) -> Category {
                match self {
                    $(Opcode::$variant => Category::$category,)+
                }
            }

            /// One-line human description.
            pub const fn description(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $desc,)+
                }
            }
        }
    };
}

opcode_table! {
    SnapshotSave = 0x1f4, "Snapshot_Save", "snapshot_save", Snapshot,
        "Save a state snapshot";
    SnapshotSaveStamped = 0x1f5, "Snapshot_SaveStamped", "snapshot_save_stamped", Snapshot,
        "Save a timestamped state snapshot";
    SnapshotRestore = 0x1f6, "Snapshot_Restore", "snapshot_restore", Snapshot,
        "Restore a state snapshot";
    SnapshotSaveCyclic = 0x1f7, "Snapshot_SaveCyclic", "snapshot_save_cyclic", Snapshot,
        "Save into the next cyclic snapshot slot";
    ResetJitEe = 0x1fe, "ResetJIT_EE", "reset_jit_ee", Jit,
        "Reset the EE recompiler";
    ResetJitIop = 0x1ff, "ResetJIT_IOP", "reset_jit_iop", Jit,
        "Reset the IOP recompiler";
    ResetJitVu = 0x200, "ResetJIT_VU", "reset_jit_vu", Jit,
        "Reset the VU recompilers";
    ExitNicely = 0x208, "ExitNicely", "exit_nicely", System,
        "Shut the emulator down cleanly";
    StopExec = 0x212, "StopExec", "stop_exec", Execution,
        "Pause emulation";
    StartExec = 0x213, "StartExec", "start_exec", Execution,
        "Resume emulation";
    ToggleExec = 0x214, "ToggleExec", "toggle_exec", Execution,
        "Toggle between paused and running";
    StepExec = 0x215, "StepExec", "step_exec", Execution,
        "Single-step emulation";
    EnableToolingMode = 0x21c, "EnableToolingMode", "enable_tooling_mode", Tooling,
        "Enable tooling mode";
    GenCoreDump = 0x221, "GenCoreDump", "gen_core_dump", Tooling,
        "Write a core dump";
    GsExternalCommand = 0x226, "GsExternalCommand", "gs_external_command", Graphics,
        "Forward an external command to the GS backend";
    RestorePointSave = 0x22b, "RestorePoint_Save", "restore_point_save", RestorePoint,
        "Record a restore point";
    RestorePointRestore = 0x22c, "RestorePoint_Restore", "restore_point_restore", RestorePoint,
        "Return to the last restore point";
    StartVkLogging = 0x230, "StartVKLogging", "start_vk_logging", Logging,
        "Start Vulkan logging";
    StopVkLogging = 0x231, "StopVKLogging", "stop_vk_logging", Logging,
        "Stop Vulkan logging";
    SoftReset = 0x23a, "SoftReset", "soft_reset", System,
        "Soft-reset the emulated machine";
    SwitchDisc = 0x23b, "SwitchDisc", "switch_disc", Disc,
        "Begin a disc switch";
    SwitchDiscSwitch = 0x23c, "SwitchDiscSwitch", "switch_disc_switch", Disc,
        "Swap in the pending disc";
    SwitchDiscClose = 0x23d, "SwitchDiscClose", "switch_disc_close", Disc,
        "Close the disc tray";
    ReloadLuaScripts = 0x23e, "ReloadLuaScripts", "reload_lua_scripts", Scripting,
        "Reload Lua scripts";
}

impl TryFrom<u16> for Opcode {
    type Error = ProtocolError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Opcode::from_code(code).ok_or(ProtocolError::UnknownOpcode(code))
    }
}

impl From<Opcode> for u16 {
    fn from(op: Opcode) -> Self {
        op.code()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses canonical (`ResetJIT_EE`), snake (`reset_jit_ee`) or kebab
/// (`reset-jit-ee`) spellings case-insensitively, or a hex wire value (`0x1fe`).
impl FromStr for Opcode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            let code = u16::from_str_radix(hex, 16)
                .map_err(|_| ProtocolError::UnknownOperation(s.to_string()))?;
            return Opcode::try_from(code);
        }

        let normalized = trimmed.to_ascii_lowercase().replace('-', "_");
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| {
                op.snake_name() == normalized || op.name().to_ascii_lowercase() == normalized
            })
            .ok_or_else(|| ProtocolError::UnknownOperation(s.to_string()))
    }
}

impl Serialize for Opcode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Opcode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
