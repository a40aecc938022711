// Wallet integration for Vaulted
// Every wallet mechanism is reduced to the same "sign a message for this
// account" capability so storage code never cares where a key lives.

mod signing;
mod keys;
mod extension;
mod relay;
mod adapter;

pub use signing::{MessageSigner, Signature, Verifier};
pub use keys::{KeyPair, PublicKey};
pub use extension::{ExtensionMetadata, KeystoreExtension, ProviderKind, WalletExtension, KEYSTORE_SOURCE};
pub use relay::{HttpRelayChannel, RelayAccount, RelayChannel, RelayConnector, RelaySession};
pub use adapter::{ActiveSigner, SignerAdapter, WalletProvider};
