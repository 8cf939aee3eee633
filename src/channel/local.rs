use super::{
    authority::{authorize_unit, Authority},
    types::{WorkOutput, WorkUnit},
    ExecutionChannel,
};
use crate::{errors::AppResult, syntax::Platform, units};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Runs units in this process, against this machine's filesystem.
#[derive(Clone)]
pub struct LocalChannel {
    authority: Option<Arc<dyn Authority>>,
}

impl LocalChannel {
    /// Without an authority every dispatch fails; there is no implicit allow.
    pub fn new(authority: Option<Arc<dyn Authority>>) -> Self {
        Self { authority }
    }
}

#[async_trait]
impl ExecutionChannel for LocalChannel {
    fn node(&self) -> &str {
        "local"
    }

    async fn platform(&self) -> AppResult<Platform> {
        Ok(Platform::host())
    }

    async fn dispatch(&self, unit: WorkUnit) -> AppResult<WorkOutput> {
        authorize_unit(self.authority.as_deref(), &unit)?;
        debug!(unit = unit.name(), node = "local", "executing unit");
        units::execute(&unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::{authority::RolePolicy, types::Role},
        errors::AppError,
    };
    use std::{
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };

    struct Counting {
        calls: AtomicUsize,
        allow: bool,
    }

    impl Authority for Counting {
        fn authorize(&self, unit: &WorkUnit) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.allow {
                Ok(())
            } else {
                Err(AppError::AuthorizationDenied(format!("{} refused", unit.name())))
            }
        }
    }

    #[tokio::test]
    async fn authority_consulted_once_per_unit() {
        let auth = Arc::new(Counting { calls: AtomicUsize::new(0), allow: true });
        let ch = LocalChannel::new(Some(auth.clone()));
        let tmp = tempfile::tempdir().unwrap();
        ch.canonicalize(tmp.path()).await.unwrap();
        ch.stat(tmp.path()).await.unwrap();
        assert_eq!(auth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn denial_prevents_execution() {
        let auth = Arc::new(Counting { calls: AtomicUsize::new(0), allow: false });
        let ch = LocalChannel::new(Some(auth.clone()));
        // a relative path would fail inside the unit; denial must come first
        let err = ch.stat(&PathBuf::from("relative")).await.unwrap_err();
        assert!(matches!(err, AppError::AuthorizationDenied(_)));
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_authority_is_an_error() {
        let ch = LocalChannel::new(None);
        let err = ch.canonicalize(&PathBuf::from("/")).await.unwrap_err();
        assert!(matches!(err, AppError::MissingAuthority));
    }

    #[tokio::test]
    async fn read_needs_read_data_role() {
        let tmp = tempfile::tempdir().unwrap();
        let f = tmp.path().join("f");
        std::fs::write(&f, "x").unwrap();
        let ch = LocalChannel::new(Some(Arc::new(RolePolicy::new([Role::Any]))));
        assert!(ch.stat(&f).await.is_ok());
        assert!(matches!(ch.read_file(&f).await, Err(AppError::AuthorizationDenied(_))));
    }
}
