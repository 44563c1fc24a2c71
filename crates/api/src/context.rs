use orglicense_directory::User;

/// The resolved identity for the current request.
///
/// The auth middleware resolves the bearer claims to a user record exactly
/// once per request and stores the result here; handlers reuse it instead of
/// re-resolving.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);
