//! Cache key layout: `crm:v1:{tenant}:{backend}:{kind}:id:{uuid}` for
//! single entities and `crm:v1:{tenant}:{backend}:{kind}:list:{filter}` for
//! list results. Reconfiguring a tenant's backend moves it to a fresh key
//! space.

use uuid::Uuid;

use crate::domain::settings::BackendKind;
use crate::repository::{Entity, ListFilter};
use crate::TenantId;

const PREFIX: &str = "crm:v1";

/// Tenant and backend that own a key.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub tenant: &'a TenantId,
    pub backend: BackendKind,
}

impl<'a> Scope<'a> {
    pub fn new(tenant: &'a TenantId, backend: BackendKind) -> Self {
        Self { tenant, backend }
    }

    fn segment(&self) -> String {
        let backend = match self.backend {
            BackendKind::Native => "native",
            BackendKind::ExternalErp => "erp",
        };
        format!("{PREFIX}:{}:{backend}", self.tenant)
    }
}

pub fn item_key(scope: Scope<'_>, kind: &str, id: Uuid) -> String {
    format!("{}:{kind}:id:{id}", scope.segment())
}

pub fn list_key<F: ListFilter>(scope: Scope<'_>, kind: &str, filter: &F) -> String {
    format!("{}:{kind}:list:{}", scope.segment(), filter.cache_suffix())
}

/// Keys a write to `id` may have made stale: the entity itself, the
/// unfiltered list, and every list that contained any of `states`.
pub fn invalidation_keys<E: Entity>(scope: Scope<'_>, id: Uuid, states: &[&E]) -> Vec<String> {
    let mut keys = vec![
        item_key(scope, E::KIND, id),
        list_key(scope, E::KIND, &E::Filter::default()),
    ];
    for state in states {
        for filter in state.list_filters() {
            let key = list_key(scope, E::KIND, &filter);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Stage, StageFilter};

    #[test]
    fn keys_are_tenant_injective() {
        let id = Uuid::new_v4();
        let acme = TenantId::parse("acme").unwrap();
        let globex = TenantId::parse("globex").unwrap();
        let acme = Scope::new(&acme, BackendKind::Native);
        let globex = Scope::new(&globex, BackendKind::Native);
        assert_ne!(item_key(acme, "tickets", id), item_key(globex, "tickets", id));
        assert_ne!(
            list_key(acme, "stages", &StageFilter::default()),
            list_key(globex, "stages", &StageFilter::default())
        );
    }

    #[test]
    fn backends_of_one_tenant_do_not_share_keys() {
        let id = Uuid::new_v4();
        let acme = TenantId::parse("acme").unwrap();
        let native = Scope::new(&acme, BackendKind::Native);
        let erp = Scope::new(&acme, BackendKind::ExternalErp);
        assert_eq!(item_key(native, "clients", id), format!("crm:v1:acme:native:clients:id:{id}"));
        assert_eq!(item_key(erp, "clients", id), format!("crm:v1:acme:erp:clients:id:{id}"));
    }

    #[test]
    fn moved_stage_invalidates_both_departments() {
        let acme = TenantId::parse("acme").unwrap();
        let before = Stage {
            id: Uuid::new_v4(),
            name: "Todo".into(),
            arrangement: 0,
            department_id: Uuid::new_v4(),
        };
        let after = Stage {
            department_id: Uuid::new_v4(),
            ..before.clone()
        };

        let scope = Scope::new(&acme, BackendKind::Native);
        let keys = invalidation_keys(scope, before.id, &[&before, &after]);
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[0], format!("crm:v1:acme:native:stages:id:{}", before.id));
        assert!(keys.contains(&"crm:v1:acme:native:stages:list:dept=*".to_string()));
        assert!(keys.contains(&format!(
            "crm:v1:acme:native:stages:list:dept={}",
            before.department_id
        )));
        assert!(keys.contains(&format!(
            "crm:v1:acme:native:stages:list:dept={}",
            after.department_id
        )));
    }
}
