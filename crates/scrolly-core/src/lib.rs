pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod graphic;
pub mod progress;
pub mod runtime;
pub mod scene;
pub mod signals;
pub mod state;
pub mod stream;
pub mod teller;
pub mod tracker;

pub use config::{EngineConfig, LayoutConfig, MediaConfig, TimingConfig};
pub use engine::Engine;
pub use env::{HeadlessPage, Host, NodeId, Rect, SharedHost, StyleMap, WindowSize};
pub use error::{Error, Result};
pub use graphic::{Graphic, GraphicOptions, TextItem};
pub use runtime::{EventLoop, Millis};
pub use scene::{Scene, SceneRegistry, Stage, StageScene, StepData, VideoParams, VideoScene};
pub use signals::{EventStreams, RawEvent};
pub use state::NarrativeState;
pub use stream::{Channel, Subscription, Subscriptions};
pub use teller::{ScrollyTeller, TellerEvent, TellerOptions, Trigger};
pub use tracker::Direction;
