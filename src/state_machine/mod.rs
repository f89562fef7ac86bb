// Task lifecycle state machine.
//
// Statuses, the events that move between them, and the single transition
// table consulted by the task graph store before it appends history.

pub mod events;
pub mod states;
pub mod task_state_machine;

pub use events::TaskEvent;
pub use states::TaskStatus;
pub use task_state_machine::TaskStateMachine;
