//! Named operations on top of the transport.
//!
//! Each operation has two entry points: `op()` sends the default argument
//! (zero) and `op_with(arg)` sends an explicit one. Both are fire-and-forget:
//! a failed send is logged and counted, never returned as an error, so a
//! missing controller cannot stall or crash the caller.

use crate::error::TransportError;
use crate::transport::{Connector, TcpConnector, Transport};
use emuctl_protocol::{CommandFrame, Opcode};
use std::sync::Arc;

/// Outcome of a fire-and-forget operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was accepted by the transport.
    Sent,
    /// The frame was dropped; see the transport's stats and `last_error`.
    Dropped,
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}

/// Command dispatcher.
pub struct Dispatcher<C: Connector = TcpConnector> {
    transport: Arc<Transport<C>>,
}

impl<C: Connector> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
        }
    }
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(transport: Arc<Transport<C>>) -> Self {
        Self { transport }
    }

    /// Returns the shared transport.
    pub fn transport(&self) -> &Arc<Transport<C>> {
        &self.transport
    }

    /// Sends one command and returns the transport's verdict.
    pub fn try_send(&self, opcode: Opcode, argument: u64) -> Result<usize, TransportError> {
        let frame = CommandFrame::new(opcode, argument);
        tracing::debug!(
            "Dispatching {} ({:#x}) arg={:#x}",
            opcode,
            opcode.code(),
            argument
        );
        self.transport.send_frame(&frame)
    }

    /// Sends one command; failures are logged and counted.
    pub fn send(&self, opcode: Opcode, argument: u64) -> Delivery {
        match self.try_send(opcode, argument) {
            Ok(_) => Delivery::Sent,
            Err(e) => {
                self.transport.stats().record_dropped();
                tracing::warn!(
                    "Dropped {} (arg={:#x}) for {}: {}",
                    opcode,
                    argument,
                    self.transport.endpoint(),
                    e
                );
                Delivery::Dropped
            }
        }
    }
}

macro_rules! operations {
    ($(
        $(#[$doc:meta])*
        $opcode:ident => $name:ident, $name_with:ident;
    )+) => {
        impl<C: Connector> Dispatcher<C> {
            $(
                $(#[$doc])*
                pub fn $name(&self) -> Delivery {
                    self.send(Opcode::$opcode, 0)
                }

                $(#[$doc])*
                ///
                /// Sends `argument` instead of the default zero.
                pub fn $name_with(&self, argument: u64) -> Delivery {
                    self.send(Opcode::$opcode, argument)
                }
            )+
        }
    };
}

operations! {
    /// Saves a state snapshot.
    SnapshotSave => snapshot_save, snapshot_save_with;
    /// Saves a timestamped state snapshot.
    SnapshotSaveStamped => snapshot_save_stamped, snapshot_save_stamped_with;
    /// Restores a state snapshot.
    SnapshotRestore => snapshot_restore, snapshot_restore_with;
    /// Saves into the next cyclic snapshot slot.
    SnapshotSaveCyclic => snapshot_save_cyclic, snapshot_save_cyclic_with;
    /// Resets the EE recompiler.
    ResetJitEe => reset_jit_ee, reset_jit_ee_with;
    /// Resets the IOP recompiler.
    ResetJitIop => reset_jit_iop, reset_jit_iop_with;
    /// Resets the VU recompilers.
    ResetJitVu => reset_jit_vu, reset_jit_vu_with;
    /// Asks the emulator to shut down cleanly.
    ExitNicely => exit_nicely, exit_nicely_with;
    /// Pauses emulation.
    StopExec => stop_exec, stop_exec_with;
    /// Resumes emulation.
    StartExec => start_exec, start_exec_with;
    /// Toggles between paused and running.
    ToggleExec => toggle_exec, toggle_exec_with;
    /// Single-steps emulation.
    StepExec => step_exec, step_exec_with;
    /// Enables tooling mode.
    EnableToolingMode => enable_tooling_mode, enable_tooling_mode_with;
    /// Writes a core dump.
    GenCoreDump => gen_core_dump, gen_core_dump_with;
    /// Forwards an external command to the GS backend.
    GsExternalCommand => gs_external_command, gs_external_command_with;
    /// Records a restore point.
    RestorePointSave => restore_point_save, restore_point_save_with;
    /// Returns to the last restore point.
    RestorePointRestore => restore_point_restore, restore_point_restore_with;
    /// Starts Vulkan logging.
    StartVkLogging => start_vk_logging, start_vk_logging_with;
    /// Stops Vulkan logging.
    StopVkLogging => stop_vk_logging, stop_vk_logging_with;
    /// Soft-resets the emulated machine.
    SoftReset => soft_reset, soft_reset_with;
    /// Begins a disc switch.
    SwitchDisc => switch_disc, switch_disc_with;
    /// Swaps in the pending disc.
    SwitchDiscSwitch => switch_disc_switch, switch_disc_switch_with;
    /// Closes the disc tray.
    SwitchDiscClose => switch_disc_close, switch_disc_close_with;
    /// Reloads Lua scripts.
    ReloadLuaScripts => reload_lua_scripts, reload_lua_scripts_with;
}
