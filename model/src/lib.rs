//! Wire representations shared between the arena server and its clients.
//!
//! Everything in this crate is `Serialize`/`Deserialize` only: no database
//! access, no business logic. The server crate owns the row types that
//! mirror these over a connection.

pub mod battle;
pub mod envelope;
pub mod generator;
pub mod level;
pub mod request;
pub mod response;
pub mod tag;
pub mod vote;

pub use battle::{Battle, BattlePresentation, BattleStatus, PlayOrder};
pub use envelope::{ErrorInfo, ErrorResponse, Envelope, PROTOCOL_VERSION};
pub use generator::GeneratorInfo;
pub use level::{Encoding, LevelFormat, LevelFormatType, LevelMetadata, LevelPayload, Side};
pub use tag::{is_allowed_tag, ALLOWED_TAGS};
pub use vote::{SideTelemetry, Telemetry, VoteResult};
