//! # Project Terminology
//!
//! Terms used throughout the drive broker. Most of them come from OAuth 2.0
//! and the Model Context Protocol.
//!
//! ## Identity Terms
//!
//! * **Client ID**: An opaque string chosen by a chat client (a UUID for
//!   `drive-chat`) and sent as `X-Client-ID`. It partitions credentials: one
//!   client never sees or uses another client's Google access. Not to be
//!   confused with the Google OAuth client id in `GOOGLE_CLIENT_ID`, which
//!   identifies the broker itself to Google.
//!
//! * **Session**: Everything the broker holds for one client id: its
//!   authorization state, a pending attempt or a credential, and timestamps.
//!   Sessions live in memory and do not survive a restart.
//!
//! ## Authorization Terms
//!
//! * **Authorization State**: One of `UNAUTHENTICATED`, `PENDING` or
//!   `AUTHENTICATED`. `AUTHENTICATED` is only reached from `PENDING` through a
//!   callback carrying the matching nonce and a successful code exchange.
//!
//! * **Nonce**: The random value sent to Google as the OAuth `state`
//!   parameter. It binds a callback to the attempt that issued it and is
//!   accepted at most once.
//!
//! * **Pending Attempt**: A consent URL that has been handed out and whose
//!   callback has not arrived. Attempts expire after `PENDING_AUTH_TTL_SECS`.
//!
//! * **Credential**: The token set returned by Google: access token, refresh
//!   token, expiry and granted scopes, plus the account email.
//!
//! * **PKCE**: Proof Key for Code Exchange. Each attempt carries a random
//!   code verifier; its SHA-256 challenge goes in the consent URL and the
//!   verifier goes with the code exchange.
//!
//! ## Tool Terms
//!
//! * **Tool**: A function the model may call through MCP `tools/call`. The
//!   set is closed: `search_drive_files` and `check_authentication_status`.
//!
//! * **authentication_required**: The tool outcome returned instead of data
//!   when the client has no usable credential. It carries the consent URL the
//!   user must open.
//!
//! * **Orchestrator**: The `drive-chat` loop that relays between the user,
//!   Gemini and the broker, and polls `check_authentication_status` while the
//!   user completes consent.
