/// OpenAPI documentation generation.
pub mod documentation;
/// Live drawing relay over WebSocket.
pub mod drawing_service;
/// Health check service.
pub mod health_service;
/// Round-gated protocol shared by every game.
pub mod round_service;
/// Session joining and pairing.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming and push-based waits.
pub mod sse_service;
/// Storage connection supervisor with exponential backoff.
pub mod storage_supervisor;
