//! macOS Keychain adapter over internet-password items.
//!
//! Host, path, port and protocol identify an item, and only an item matching
//! all four exactly belongs to a server. The Security framework treats a zero
//! port as "any port" in its lookups, so candidates are listed with their
//! attributes and filtered here before anything is read, changed or removed.

use std::ptr;

use core_foundation::{
    array::CFArray,
    base::{CFType, CFTypeRef, OSStatus, TCFType},
    boolean::CFBoolean,
    data::CFData,
    dictionary::CFDictionary,
    number::CFNumber,
    string::CFString,
};
use credbridge_core::{CredentialError, CredentialStore, Credentials, Protocol, ServerDescriptor};
use security_framework::{
    base::Error as SecError,
    item::{ItemClass, ItemSearchOptions, Limit, SearchResult},
    os::macos::keychain_item::SecKeychainItem,
};
use security_framework_sys::{
    base::errSecItemNotFound,
    keychain::{SecAuthenticationType, SecKeychainAddInternetPassword, SecProtocolType},
    keychain_item::SecItemCopyMatching,
};
use tracing::{debug, instrument};

/// Message used when the platform cannot describe a status code.
pub const UNKNOWN_ERROR: &str = "Unknown error";

// Keys of SecItemCopyMatching queries and result dictionaries.
const CLASS_KEY: &str = "class";
const CLASS_INTERNET_PASSWORD: &str = "inet";
const MATCH_ITEM_LIST_KEY: &str = "m_ItemList";
const MATCH_LIMIT_KEY: &str = "m_Limit";
const MATCH_LIMIT_ONE: &str = "m_LimitOne";
const RETURN_DATA_KEY: &str = "r_Data";
const ITEM_REF_KEY: &str = "v_Ref";
const SERVER_KEY: &str = "srvr";
const PORT_KEY: &str = "port";
const PATH_KEY: &str = "path";
const PROTOCOL_KEY: &str = "ptcl";
const ACCOUNT_KEY: &str = "acct";

fn status_message(status: OSStatus) -> String {
    SecError::from_code(status)
        .message()
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

fn keychain_err(err: SecError) -> CredentialError {
    match err.code() {
        status if status == errSecItemNotFound => CredentialError::NotFound,
        status => CredentialError::Keychain {
            status,
            message: status_message(status),
        },
    }
}

fn check(status: OSStatus) -> Result<(), CredentialError> {
    match status {
        0 => Ok(()),
        status => Err(keychain_err(SecError::from_code(status))),
    }
}

fn protocol_type(protocol: Protocol) -> SecProtocolType {
    match protocol {
        Protocol::Http => SecProtocolType::HTTP,
        Protocol::Https => SecProtocolType::HTTPS,
    }
}

/// Four-char code of `protocol` as stored in the `ptcl` attribute.
fn protocol_tag(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Http => "http",
        Protocol::Https => "htps",
    }
}

fn field_len(value: &str) -> Result<u32, CredentialError> {
    u32::try_from(value.len())
        .map_err(|_| CredentialError::Platform("keychain field too long".to_string()))
}

/// Identifying attributes of a stored internet password.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ItemAttributes {
    server: String,
    port: u16,
    path: String,
    protocol: String,
    account: String,
}

impl ItemAttributes {
    fn identifies(&self, server: &ServerDescriptor) -> bool {
        self.server == server.host()
            && self.port == server.port()
            && self.path == server.path()
            && self.protocol == protocol_tag(server.protocol())
    }
}

fn lookup(dict: &CFDictionary<CFString, CFType>, key: &'static str) -> Option<CFType> {
    dict.find(&CFString::from_static_string(key))
        .map(|value| (*value).clone())
}

/// Text of a string attribute; four-char codes may also come back as numbers.
fn text(value: &CFType) -> Option<String> {
    if let Some(string) = value.downcast::<CFString>() {
        return Some(string.to_string());
    }
    let code = value.downcast::<CFNumber>()?.to_i64()?;
    let code = u32::try_from(code).ok()?;
    Some(String::from_utf8_lossy(&code.to_be_bytes()).into_owned())
}

fn read_attributes(dict: &CFDictionary<CFString, CFType>) -> ItemAttributes {
    let text_of = |key: &'static str| {
        lookup(dict, key)
            .and_then(|value| text(&value))
            .unwrap_or_default()
    };
    // A missing port is the same as port 0.
    let port = lookup(dict, PORT_KEY)
        .and_then(|value| value.downcast::<CFNumber>())
        .and_then(|number| number.to_i64())
        .and_then(|number| u16::try_from(number).ok())
        .unwrap_or(0);

    ItemAttributes {
        server: text_of(SERVER_KEY),
        port,
        path: text_of(PATH_KEY),
        protocol: text_of(PROTOCOL_KEY),
        account: text_of(ACCOUNT_KEY),
    }
}

fn candidate(result: &SearchResult) -> Option<(ItemAttributes, SecKeychainItem)> {
    let SearchResult::Dict(raw) = result else {
        return None;
    };
    // SAFETY: SecItemCopyMatching returns attribute dictionaries keyed by
    // CFString; the get rule takes its own retain on the dictionary.
    let dict: CFDictionary<CFString, CFType> =
        unsafe { CFDictionary::wrap_under_get_rule(raw.as_concrete_TypeRef()) };
    let item = lookup(&dict, ITEM_REF_KEY)?.downcast::<SecKeychainItem>()?;
    Some((read_attributes(&dict), item))
}

/// Every internet password whose host, port, path and protocol equal `server`'s.
fn exact_items(
    server: &ServerDescriptor,
) -> Result<Vec<(ItemAttributes, SecKeychainItem)>, CredentialError> {
    let results = match ItemSearchOptions::new()
        .class(ItemClass::internet_password())
        .load_attributes(true)
        .load_refs(true)
        .limit(Limit::All)
        .search()
    {
        Ok(results) => results,
        Err(err) if err.code() == errSecItemNotFound => return Ok(Vec::new()),
        Err(err) => return Err(keychain_err(err)),
    };

    Ok(results
        .iter()
        .filter_map(candidate)
        .filter(|(attributes, _)| attributes.identifies(server))
        .collect())
}

/// Read the password of one specific item.
fn password(item: &SecKeychainItem) -> Result<String, CredentialError> {
    let query = CFDictionary::from_CFType_pairs(&[
        (
            CFString::from_static_string(CLASS_KEY),
            CFString::from_static_string(CLASS_INTERNET_PASSWORD).as_CFType(),
        ),
        (
            CFString::from_static_string(MATCH_ITEM_LIST_KEY),
            CFArray::from_CFTypes(&[item.clone()]).as_CFType(),
        ),
        (
            CFString::from_static_string(MATCH_LIMIT_KEY),
            CFString::from_static_string(MATCH_LIMIT_ONE).as_CFType(),
        ),
        (
            CFString::from_static_string(RETURN_DATA_KEY),
            CFBoolean::true_value().as_CFType(),
        ),
    ]);

    let mut result: CFTypeRef = ptr::null();
    // SAFETY: `query` is a live dictionary and `result` receives one owned
    // reference on success, which the create rule takes over.
    let data = unsafe {
        check(SecItemCopyMatching(query.as_concrete_TypeRef(), &mut result))?;
        CFType::wrap_under_create_rule(result)
    };

    let bytes = data
        .downcast::<CFData>()
        .map(|data| data.bytes().to_vec())
        .unwrap_or_default();
    String::from_utf8(bytes)
        .map_err(|_| CredentialError::Platform("stored secret is not valid UTF-8".to_string()))
}

/// Create a new item in the default keychain.
fn insert(server: &ServerDescriptor, credentials: &Credentials) -> Result<(), CredentialError> {
    let host = server.host();
    let path = server.path();
    let username = credentials.username.as_str();
    let secret = credentials.secret.as_str();

    // SAFETY: every (length, pointer) pair describes a live borrowed string;
    // the keychain is the default one and no item ref is requested back.
    let status = unsafe {
        SecKeychainAddInternetPassword(
            ptr::null_mut(),
            field_len(host)?,
            host.as_ptr().cast(),
            0,
            ptr::null(),
            field_len(username)?,
            username.as_ptr().cast(),
            field_len(path)?,
            path.as_ptr().cast(),
            server.port(),
            protocol_type(server.protocol()),
            SecAuthenticationType::Default,
            field_len(secret)?,
            secret.as_ptr().cast(),
            ptr::null_mut(),
        )
    };
    check(status)
}

/// Credential store backed by the user's default keychain search list.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeychainStore;

impl KeychainStore {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialStore for KeychainStore {
    #[instrument(skip_all, fields(server = %server))]
    fn add(
        &self,
        server: &ServerDescriptor,
        credentials: &Credentials,
    ) -> Result<(), CredentialError> {
        let (same, stale): (Vec<_>, Vec<_>) = exact_items(server)?
            .into_iter()
            .partition(|(attributes, _)| attributes.account == credentials.username);

        // Write before removing anything so a failed write keeps the old entry.
        match same.into_iter().next() {
            Some((_, mut item)) => item
                .set_password(credentials.secret.as_bytes())
                .map_err(keychain_err)?,
            None => insert(server, credentials)?,
        }

        let replaced = stale.len();
        for (_, item) in stale {
            item.delete();
        }

        debug!(replaced, "stored credentials");
        Ok(())
    }

    #[instrument(skip_all, fields(server = %server))]
    fn get(&self, server: &ServerDescriptor) -> Result<Credentials, CredentialError> {
        let mut items = exact_items(server)?;
        let (attributes, item) = match items.len() {
            0 => return Err(CredentialError::NotFound),
            1 => items.pop().ok_or(CredentialError::NotFound)?,
            count => {
                return Err(CredentialError::Ambiguous {
                    server: server.to_string(),
                    count,
                })
            }
        };
        let secret = password(&item)?;

        debug!("found credentials");
        Ok(Credentials {
            username: attributes.account,
            secret,
        })
    }

    #[instrument(skip_all, fields(server = %server))]
    fn delete(&self, server: &ServerDescriptor) -> Result<(), CredentialError> {
        let items = exact_items(server)?;
        if items.is_empty() {
            return Err(CredentialError::NotFound);
        }

        let removed = items.len();
        for (_, item) in items {
            item.delete();
        }
        debug!(removed, "deleted credentials");
        Ok(())
    }
}
