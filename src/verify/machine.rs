//! Pure phase machine for the document-capture flow.

use crate::docv::{VendorEvent, VendorSession};

#[derive(Debug, Clone)]
pub enum VerifyPhase {
    Init,
    GettingToken,
    /// Vendor session created; the capture widget can be embedded with it.
    LoadingWidget {
        session: VendorSession,
    },
    InitializingWidget,
    Verifying {
        /// Vendor stage label, e.g. "document uploaded".
        stage: Option<String>,
    },
    Success,
    Error {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub enum VerifyEvent {
    Started,
    TokenReceived(VendorSession),
    TokenFailed(String),
    WidgetLoaded,
    WidgetFailed(String),
    WidgetReady,
    Vendor(VendorEvent),
}

/// Advance the machine by one event. Unmatched pairs leave the phase
/// unchanged; `Success` and `Error` are terminal.
#[must_use]
pub fn transition(phase: VerifyPhase, event: VerifyEvent) -> VerifyPhase {
    match (phase, event) {
        (VerifyPhase::Init, VerifyEvent::Started) => VerifyPhase::GettingToken,

        (VerifyPhase::GettingToken, VerifyEvent::TokenReceived(session)) => {
            VerifyPhase::LoadingWidget { session }
        }
        (VerifyPhase::GettingToken, VerifyEvent::TokenFailed(message)) => {
            VerifyPhase::Error { message }
        }

        (VerifyPhase::LoadingWidget { .. }, VerifyEvent::WidgetLoaded) => {
            VerifyPhase::InitializingWidget
        }
        (VerifyPhase::LoadingWidget { .. }, VerifyEvent::WidgetFailed(message)) => {
            VerifyPhase::Error { message }
        }

        (VerifyPhase::InitializingWidget, VerifyEvent::WidgetReady) => {
            VerifyPhase::Verifying { stage: None }
        }
        (VerifyPhase::InitializingWidget, VerifyEvent::WidgetFailed(message)) => {
            VerifyPhase::Error { message }
        }

        (VerifyPhase::Verifying { .. }, VerifyEvent::Vendor(event)) => match event {
            VendorEvent::Progress(stage) => VerifyPhase::Verifying { stage: Some(stage) },
            VendorEvent::Success { .. } => VerifyPhase::Success,
            VendorEvent::Error(message) => VerifyPhase::Error { message },
        },

        (phase, _) => phase,
    }
}
