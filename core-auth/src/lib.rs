//! # Authentication Module
//!
//! Google Drive authorization for cloud backups.
//!
//! ## Overview
//!
//! This module handles the desktop OAuth 2.0 installed-app flow for the
//! `drive.file` scope: client secret discovery, PKCE authorization, token
//! refresh and an on-disk token cache.
//!
//! ## Features
//!
//! - OAuth 2.0 authorization code flow with PKCE (`S256`)
//! - Automatic token refresh before expiration
//! - Interactive, silent-cached and silent-only session modes
//! - Client secret resolution from env, app data, working directory or a
//!   bundled fallback

pub mod client_secret;
pub mod error;
pub mod oauth;
pub mod session;
pub mod token_store;
pub mod types;

pub use client_secret::{ClientSecret, ClientSecretLocator};
pub use error::{AuthError, Result};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use session::{
    AccessTokenProvider, AuthorizationCallback, AuthorizationPrompt, DriveSessionManager,
};
pub use token_store::TokenStore;
pub use types::{OAuthTokens, SessionMode};
