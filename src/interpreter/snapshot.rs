//! Whole-VM snapshots
//!
//! A snapshot holds everything needed to continue execution at the next
//! instruction. Host function pointers cannot be serialized, so snapshots
//! record native *names*; the receiving VM must have registered the same
//! natives in the same order.

use serde::{Deserialize, Serialize};

use super::environment::EnvironmentStack;
use super::stack::StackFrame;
use super::{Realm, Vm, VmConfig};
use crate::compiler::{Constant, Instruction};
use crate::error::JsError;
use crate::gc::Heap;
use crate::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSnapshot {
    pub code: Vec<Instruction>,
    pub constants: Vec<Constant>,
    pub pc: usize,
    pub stack: Vec<Value>,
    pub frames: Vec<StackFrame>,
    pub environments: EnvironmentStack,
    pub heap: Heap,
    pub realm: Realm,
    pub natives: Vec<String>,
    pub config: VmConfig,
}

impl Vm {
    /// Capture the complete execution state.
    ///
    /// Fails while a host call is in progress, since host frames cannot be
    /// captured.
    pub fn dump(&self) -> Result<VmSnapshot, JsError> {
        if !self.boundaries.is_empty() {
            return Err(JsError::SnapshotMismatch {
                message: "cannot dump while a host call is active".to_string(),
            });
        }
        log::debug!(
            "dump: pc={} stack={} frames={} heap={}",
            self.pc,
            self.stack.len(),
            self.frames.len(),
            self.heap.len()
        );
        Ok(VmSnapshot {
            code: self.code.clone(),
            constants: self.constants.clone(),
            pc: self.pc,
            stack: self.stack.clone(),
            frames: self.frames.clone(),
            environments: self.envs.clone(),
            heap: self.heap.clone(),
            realm: self.realm,
            natives: self.native_names(),
            config: self.config.clone(),
        })
    }

    /// Replace the execution state with `snapshot`
    pub fn load(&mut self, snapshot: VmSnapshot) -> Result<(), JsError> {
        if !self.boundaries.is_empty() {
            return Err(JsError::SnapshotMismatch {
                message: "cannot load while a host call is active".to_string(),
            });
        }
        let natives = self.native_names();
        if snapshot.natives != natives {
            let first_difference = snapshot
                .natives
                .iter()
                .zip(&natives)
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| snapshot.natives.len().min(natives.len()));
            return Err(JsError::SnapshotMismatch {
                message: format!(
                    "native table differs at entry {} ({} in snapshot, {} registered)",
                    first_difference,
                    snapshot.natives.len(),
                    natives.len()
                ),
            });
        }

        log::debug!(
            "load: pc={} stack={} frames={} heap={}",
            snapshot.pc,
            snapshot.stack.len(),
            snapshot.frames.len(),
            snapshot.heap.len()
        );
        self.code = snapshot.code;
        self.constants = snapshot.constants;
        self.pc = snapshot.pc;
        self.stack = snapshot.stack;
        self.frames = snapshot.frames;
        self.envs = snapshot.environments;
        self.heap = snapshot.heap;
        self.realm = snapshot.realm;
        self.config = snapshot.config;
        Ok(())
    }

    pub fn dump_json(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.dump()?)?)
    }

    pub fn load_json(&mut self, json: &str) -> Result<(), JsError> {
        let snapshot: VmSnapshot = serde_json::from_str(json)?;
        self.load(snapshot)
    }
}
