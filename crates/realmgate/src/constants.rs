//! Constants for realmgate

/// Value-type of a binary security token carrying a CAS service ticket
pub const CAS_TICKET_VALUE_TYPE: &str = "urn:ogc:def:ows:CAS:ServiceTicket";

/// Value-type of a binary security token carrying an ordered X.509 PKI path
pub const X509_PKI_PATH_VALUE_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509PKIPathv1";

/// Value-type of a binary security token carrying a single X.509 certificate
pub const X509_V3_VALUE_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";

/// Encoding-type of base64 binary security tokens
pub const BASE64_ENCODING_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// HTTP authorization header name (lowercase, headers are matched case-insensitively)
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// OAuth authorization code request parameter
pub const CODE_PARAM: &str = "code";

/// OAuth access token request parameter
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// OIDC ID token request parameter
pub const ID_TOKEN_PARAM: &str = "id_token";

/// OAuth state request parameter
pub const STATE_PARAM: &str = "state";

/// Federated source the OIDC login is for
pub const SOURCE_ID_PARAM: &str = "source_id";

/// Realm attribute key stored with cached validations
pub const REALM_PROPERTY: &str = "realm";

/// Persisted policy property: per-path credential kinds
pub const AUTH_TYPES_KEY: &str = "authenticationTypes";

/// Persisted policy property: per-path realm
pub const REALMS_KEY: &str = "realms";

/// Persisted policy property: per-path required attributes
pub const REQUIRED_ATTRIBUTES_KEY: &str = "requiredAttributes";

/// Persisted policy property: unauthenticated paths
pub const WHITE_LIST_CONTEXTS_KEY: &str = "whiteListContexts";

/// Default subdirectory name for encrypted token files
pub const TOKEN_STORE_DIR: &str = "tokens";
