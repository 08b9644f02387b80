use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, trace};

use super::dispatcher::Dispatcher;
use super::script::Instruction;
use crate::utils::VariableStore;

/// Fatal engine conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A jump targeted an index outside the loaded program (corrupt loop stack).
    #[error("instruction index {index} out of range (program length {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// No program loaded.
    Idle,
    /// The program counter points at an instruction.
    Running,
    /// The program counter equals the program length.
    Halted,
}

/// The engine's view handed to a command handler for the duration of one step.
///
/// Besides the shared variables, it exposes the index of the instruction being
/// executed and lets control-flow handlers request a jump. The engine applies
/// the jump after the handler returns; without one, the counter advances by one.
pub struct StepContext<'a> {
    index: usize,
    len: usize,
    jump: Option<usize>,
    vars: &'a mut VariableStore,
}

impl<'a> StepContext<'a> {
    pub fn new(index: usize, len: usize, vars: &'a mut VariableStore) -> Self {
        Self {
            index,
            len,
            jump: None,
            vars,
        }
    }

    /// Index of the instruction currently executing.
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Number of instructions in the program.
    pub fn program_len(&self) -> usize {
        self.len
    }

    /// Continue execution at `target` instead of the next instruction.
    pub fn jump_to(&mut self, target: usize) -> Result<(), EngineError> {
        if target >= self.len {
            return Err(EngineError::IndexOutOfRange {
                index: target,
                len: self.len,
            });
        }
        self.jump = Some(target);
        Ok(())
    }

    pub fn jump_target(&self) -> Option<usize> {
        self.jump
    }

    pub fn vars(&self) -> &VariableStore {
        self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VariableStore {
        self.vars
    }
}

/// Runs a flat instruction list with a program counter.
///
/// Each `step` dispatches the instruction under the counter, then moves the
/// counter to the handler's jump target if it set one, or to the next
/// instruction otherwise.
pub struct ScriptEngine {
    dispatcher: Dispatcher,
    vars: VariableStore,
    program: Option<Vec<Instruction>>,
    pc: usize,
    steps: u64,
}

impl ScriptEngine {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            vars: VariableStore::new(),
            program: None,
            pc: 0,
            steps: 0,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn variables(&self) -> &VariableStore {
        &self.vars
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.vars
    }

    /// Replace the program and rewind to its first instruction.
    pub fn load(&mut self, instructions: Vec<Instruction>) {
        debug!(target: "otto::runtime", commands = instructions.len(), "Program loaded");
        self.dispatcher.reset_handlers();
        self.program = Some(instructions);
        self.pc = 0;
        self.steps = 0;
    }

    pub fn state(&self) -> EngineState {
        match &self.program {
            None => EngineState::Idle,
            Some(program) if self.pc < program.len() => EngineState::Running,
            Some(_) => EngineState::Halted,
        }
    }

    pub fn current_index(&self) -> usize {
        self.pc
    }

    /// Move the program counter. Fails when `index` is not a valid instruction index.
    pub fn set_index(&mut self, index: usize) -> Result<(), EngineError> {
        let len = self.program.as_ref().map_or(0, Vec::len);
        if index >= len {
            return Err(EngineError::IndexOutOfRange { index, len });
        }
        self.pc = index;
        Ok(())
    }

    /// Number of steps executed since the last `load`.
    pub fn steps_executed(&self) -> u64 {
        self.steps
    }

    /// Execute one instruction. Does nothing unless the engine is running.
    pub fn step(&mut self) -> Result<()> {
        let Some(program) = self.program.as_ref() else {
            return Ok(());
        };
        let Some(instruction) = program.get(self.pc) else {
            return Ok(());
        };

        trace!(target: "otto::runtime", index = self.pc, "Executing step");
        let mut ctx = StepContext::new(self.pc, program.len(), &mut self.vars);
        self.dispatcher.dispatch(instruction, &mut ctx)?;
        let jump = ctx.jump_target();

        self.steps += 1;
        match jump {
            Some(target) => {
                trace!(target: "otto::runtime", from = self.pc, to = target, "Jump");
                self.pc = target;
            }
            None => self.pc += 1,
        }
        Ok(())
    }

    /// Step until the program halts. Returns the number of steps executed.
    pub fn run_to_completion(&mut self) -> Result<u64> {
        info!(
            target: "otto::runtime",
            commands = self.program.as_ref().map_or(0, Vec::len),
            "Executing commands"
        );
        while self.state() == EngineState::Running {
            let index = self.pc;
            self.step()
                .with_context(|| format!("Script failed at command {}", index + 1))?;
        }
        info!(target: "otto::runtime", steps = self.steps, "All commands executed");
        Ok(self.steps)
    }
}
