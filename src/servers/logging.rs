/// This is the message that the "launcher" spawned task sends to the main application process to notify the service was successfully started.
///
/// > **NOTICE**: Do not remove or change this message. The application parses it.
pub const STARTED_ON: &str = "Started on";

/// Logged by the gateway once it listens on its subjects.
pub const LISTENING_ON: &str = "Listening on";
