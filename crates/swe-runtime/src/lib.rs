//! # swe-runtime
//!
//! The agent loop and everything it drives: tool dispatch, approval
//! gating, sub-agent delegation, session assembly and thread persistence.
//!
//! ## Architecture
//!
//! ```text
//!              ┌──────────────┐
//!              │   Operator   │  ← REPL or --non-interactive
//!              └──────┬───────┘
//!                     │ user input
//!                     ▼
//!              ┌──────────────┐
//!              │  Agent Loop  │
//!              │              │
//!              │  1. Call     │  ← ModelRouter (retry/backoff)
//!              │  2. Record   │  ← Transcript
//!              │  3. Screen   │  ← schema check, ApprovalGate
//!              │  4. Execute  │  ← reads in parallel, writes in order
//!              │  5. Repeat   │  ← until final answer or cycle limit
//!              └──────────────┘
//!                     │
//!         ┌───────────┼───────────┐
//!         ▼           ▼           ▼
//!    ┌─────────┐ ┌─────────┐ ┌──────────┐
//!    │ Builtin │ │  Todos  │ │ SubAgent │
//!    │  Tools  │ │         │ │ Factory  │
//!    └─────────┘ └─────────┘ └──────────┘
//! ```

pub mod agent_loop;
pub mod session;
pub mod sub_agent;
pub mod threads;
pub mod tool_dispatch;
pub mod tools;

pub use agent_loop::{AgentLoop, LoopSettings, TurnOutcome};
pub use session::{Session, SessionBuilder, build_router, build_system_prompt, environment_block};
pub use sub_agent::{SubAgentFactory, SubAgentSettings, SubAgentTask};
pub use threads::{ThreadRecord, ThreadStore, ThreadSummary};
pub use tool_dispatch::{ToolDispatcher, render_todos};
pub use tools::{BuiltinTools, ToolSettings};
