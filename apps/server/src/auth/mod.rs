pub mod tokens;

pub use tokens::{
    mint_admin_token, mint_player_token, verify_admin_token, verify_player_token, TokenKey,
};
