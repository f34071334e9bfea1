//! Storage request paths.

use std::borrow::Cow;
use std::fmt;

/// A parsed `/version/account[/container[/object]]` request path.
///
/// Segments are kept exactly as they appear in the request URI (still
/// percent-encoded), so a rebuilt path addresses the same resource. The
/// object name may itself contain `/`. Names handed in or out as plain
/// strings ([`ObjectPath::object_name`], [`ObjectPath::sibling`]) are
/// decoded.
///
/// # Example
///
/// ```
/// use mnemosyne_core::ObjectPath;
///
/// let path = ObjectPath::parse("/v1/AUTH_test/photos/2024/cat.jpg").unwrap();
/// assert!(path.is_object());
/// assert_eq!(path.container(), Some("photos"));
/// assert_eq!(path.object(), Some("2024/cat.jpg"));
///
/// let container = ObjectPath::parse("/v1/AUTH_test/photos").unwrap();
/// assert!(!container.is_object());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    version: String,
    account: String,
    container: Option<String>,
    object: Option<String>,
}

impl ObjectPath {
    /// Parses a request path.
    ///
    /// Returns `None` when the path does not name at least a version and an
    /// account, or when an inner segment is empty.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix('/')?;
        let mut segments = rest.splitn(4, '/');

        let version = non_empty(segments.next())?;
        let account = non_empty(segments.next())?;
        let container = segments.next();
        let object = segments.next();

        let (container, object) = match (container, object) {
            (None | Some(""), None) => (None, None),
            (Some(""), Some(_)) => return None,
            (Some(c), None | Some("")) => (Some(c.to_string()), None),
            (Some(c), Some(o)) => (Some(c.to_string()), Some(o.to_string())),
            (None, Some(_)) => return None,
        };

        Some(Self {
            version: version.to_string(),
            account: account.to_string(),
            container,
            object,
        })
    }

    /// Returns `true` when the path names a specific object.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.object.is_some()
    }

    /// Returns the storage API version segment.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the account segment.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Returns the container segment.
    #[must_use]
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Returns the object name.
    #[must_use]
    pub fn object(&self) -> Option<&str> {
        self.object.as_deref()
    }

    /// Returns the decoded object name.
    #[must_use]
    pub fn object_name(&self) -> Option<Cow<'_, str>> {
        self.object.as_deref().map(decode)
    }

    /// Returns the whole path with every segment decoded.
    ///
    /// Two spellings of the same resource, such as `o.txt` and `o%2Etxt`,
    /// decode to the same string.
    #[must_use]
    pub fn decoded(&self) -> String {
        decode(&self.to_string()).into_owned()
    }

    /// Returns the path of the enclosing container, or `None` for an
    /// account-level path.
    #[must_use]
    pub fn container_path(&self) -> Option<String> {
        self.container
            .as_ref()
            .map(|c| format!("/{}/{}/{}", self.version, self.account, c))
    }

    /// Returns a path in the same account addressing the object named
    /// `object` inside the container named `container`.
    ///
    /// Both names are plain, not URI text: they are percent-encoded here, so
    /// characters such as `?` or a space stay part of the name. A `/` in the
    /// object name is kept as a separator.
    #[must_use]
    pub fn sibling(&self, container: &str, object: &str) -> Self {
        Self {
            version: self.version.clone(),
            account: self.account.clone(),
            container: Some(urlencoding::encode(container).into_owned()),
            object: Some(
                object
                    .split('/')
                    .map(urlencoding::encode)
                    .collect::<Vec<_>>()
                    .join("/"),
            ),
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.version, self.account)?;
        if let Some(container) = &self.container {
            write!(f, "/{container}")?;
        }
        if let Some(object) = &self.object {
            write!(f, "/{object}")?;
        }
        Ok(())
    }
}

/// Percent-decodes `raw`, keeping it unchanged when the bytes are not UTF-8.
fn decode(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

fn non_empty(segment: Option<&str>) -> Option<&str> {
    segment.filter(|s| !s.is_empty())
}
