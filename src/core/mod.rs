pub mod audio;
pub mod dialogue;

// Re-export commonly used types for convenience
pub use audio::{
    AudioCapture, AudioError, AudioOutput, AudioResult, CaptureController, PlaybackBuffer,
    PlayableBuffer, TurnState, TurnTracker,
};

pub use dialogue::{
    DialogueConfig, DialogueError, DialogueEvent, DialogueResult, GeminiClient, SessionState,
    StreamSession,
};
