mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use common::{account, ids, seeded, Account, Other};
use query_core::{BoolOp, Condition, OrderKey, Paginator, ParameterSet, Value};
use query_db::memory::{EntityListener, ListenerRegistry, Validator};
use query_db::{CompileError, InMemoryRepository, RepoError, Repository};

#[test]
fn create_assigns_sequential_ids() {
    let repo = seeded();
    assert_eq!(repo.count().unwrap(), 10);
    assert_eq!(ids(&repo.find_all(&[]).unwrap()), (1..=10).collect::<Vec<_>>());
}

#[test]
fn find_by_single_property() {
    let repo = seeded();
    let rows = repo.find_by(&ParameterSet::with("account_id", 1)).unwrap();
    assert_eq!(ids(&rows), vec![1, 2, 3, 4, 5]);

    let rows = repo
        .find_by_property("active", Value::Bool(true))
        .unwrap();
    assert_eq!(ids(&rows), vec![2, 4, 6, 8, 10]);
}

#[test]
fn and_binds_tighter_than_or() {
    let repo = seeded();
    // account_id = 1 and active or hits = 9
    let params = ParameterSet::with("account_id", 1)
        .param("active", true)
        .param("hits", Condition::eq(9).or());
    assert_eq!(ids(&repo.find_by(&params).unwrap()), vec![2, 4, 9]);

    // hits = 9 or account_id = 1 and active
    let params = ParameterSet::with("hits", 9)
        .param("account_id", Condition::eq(1).or())
        .param("active", true);
    assert_eq!(ids(&repo.find_by(&params).unwrap()), vec![2, 4, 9]);
}

#[test]
fn groups_are_evaluated_as_units() {
    let repo = seeded();
    let group = ParameterSet::with("hits", 1).param("hits_alias_unused", Condition::is_null());
    assert!(matches!(
        repo.find_by(&ParameterSet::new().group(group, BoolOp::And)),
        Err(RepoError::Compile(CompileError::UnknownProperty(_)))
    ));

    let group = ParameterSet::with("hits", 1).param("hits", Condition::eq(7));
    // last write wins inside the group: hits = 7
    let params = ParameterSet::with("account_id", 2).group(group, BoolOp::And);
    assert_eq!(ids(&repo.find_by(&params).unwrap()), vec![7]);

    let group = ParameterSet::with("hits", 1).param("views", Condition::eq(70).or());
    let params = ParameterSet::with("active", false).group(group, BoolOp::And);
    assert_eq!(ids(&repo.find_by(&params).unwrap()), vec![1, 7]);
}

#[test]
fn like_and_string_equality_use_sql_wildcards() {
    let repo = seeded();
    let rows = repo.find_by(&ParameterSet::with("name", "Account 1%")).unwrap();
    assert_eq!(ids(&rows), vec![1, 10]);

    let rows = repo
        .find_by(&ParameterSet::with("name", Condition::ends_with("0")))
        .unwrap();
    assert_eq!(ids(&rows), vec![10]);

    let rows = repo
        .find_by(&ParameterSet::with("name", Condition::like("account%")))
        .unwrap();
    assert!(rows.is_empty(), "LIKE is case-sensitive");
}

#[test]
fn comparison_operators() {
    let repo = seeded();
    let rows = repo
        .find_by(&ParameterSet::with("hits", Condition::between(3, 5)))
        .unwrap();
    assert_eq!(ids(&rows), vec![3, 4, 5]);

    // Int property against Long / Double operands
    let rows = repo
        .find_by(&ParameterSet::with("hits", Condition::gt(8i64)))
        .unwrap();
    assert_eq!(ids(&rows), vec![9, 10]);
    let rows = repo
        .find_by(&ParameterSet::with("score", Condition::leq(1.0)))
        .unwrap();
    assert_eq!(ids(&rows), vec![1, 2]);

    let rows = repo
        .find_by(&ParameterSet::with("hits", Condition::not_in([1, 2, 3, 4, 5, 6, 7])))
        .unwrap();
    assert_eq!(ids(&rows), vec![8, 9, 10]);

    let rows = repo
        .find_by(&ParameterSet::with("account_id", Condition::not_eq(1)))
        .unwrap();
    assert_eq!(ids(&rows), vec![6, 7, 8, 9, 10]);
}

#[test]
fn nulls_never_match_comparisons() {
    let repo = seeded();
    // id 4 has no score
    let rows = repo
        .find_by(&ParameterSet::with("score", Condition::not_eq(2.0)))
        .unwrap();
    assert!(!ids(&rows).contains(&4));

    let rows = repo
        .find_by(&ParameterSet::with("score", Condition::is_null()))
        .unwrap();
    assert_eq!(ids(&rows), vec![4]);

    let rows = repo.find_by(&ParameterSet::with("score", Value::Null)).unwrap();
    assert_eq!(ids(&rows), vec![4]);
}

#[test]
fn nested_paths_short_circuit_on_null_hops() {
    let repo = seeded();
    let rows = repo
        .find_by(&ParameterSet::with("other.name", "other-1"))
        .unwrap();
    assert_eq!(ids(&rows), vec![1, 5, 7]);

    // a null hop is not "is null": 3, 6, 9 have no `other`
    let rows = repo
        .find_by(&ParameterSet::with("other.rank", Condition::is_null()))
        .unwrap();
    assert_eq!(ids(&rows), vec![1]);

    let rows = repo
        .find_by(&ParameterSet::with("other", Condition::is_null()))
        .unwrap();
    assert_eq!(ids(&rows), vec![3, 6, 9]);

    // a path ending on a record compares its identity
    let rows = repo.find_by(&ParameterSet::with("other", 102i64)).unwrap();
    assert_eq!(ids(&rows), vec![2]);
}

#[test]
fn unknown_paths_and_subselects_are_compile_errors() {
    let repo = seeded();
    assert!(matches!(
        repo.find_by(&ParameterSet::with("nope", 1)),
        Err(RepoError::Compile(CompileError::UnknownProperty(p))) if p == "nope"
    ));
    assert!(matches!(
        repo.find_by(&ParameterSet::with("other.nope", 1)),
        Err(RepoError::Compile(CompileError::UnknownProperty(_)))
    ));
    assert!(matches!(
        repo.find_by(&ParameterSet::with(
            "id",
            Condition::in_subquery("select o.id from Other o")
        )),
        Err(RepoError::Compile(CompileError::Unsupported(_)))
    ));
}

#[test]
fn ordering_is_applied() {
    let repo = seeded();
    let rows = repo
        .find_by(&ParameterSet::with("account_id", 1).desc("hits"))
        .unwrap();
    assert_eq!(ids(&rows), vec![5, 4, 3, 2, 1]);

    let rows = repo
        .find_all(&[OrderKey::asc("active"), OrderKey::desc("id")])
        .unwrap();
    assert_eq!(ids(&rows), vec![9, 7, 5, 3, 1, 10, 8, 6, 4, 2]);

    // nulls first ascending
    let rows = repo.find_all(&[OrderKey::asc("score")]).unwrap();
    assert_eq!(rows[0].id, Some(4));
}

#[test]
fn single_first_and_load() {
    let repo = seeded();
    assert!(matches!(
        repo.find_single(&ParameterSet::with("account_id", 1)),
        Err(RepoError::NonUnique { count: 5, .. })
    ));
    let one = repo
        .find_single(&ParameterSet::with("hits", 3))
        .unwrap()
        .unwrap();
    assert_eq!(one.id, Some(3));
    assert!(repo
        .find_single(&ParameterSet::with("hits", 300))
        .unwrap()
        .is_none());

    let first = repo
        .find_first(&ParameterSet::with("account_id", 2).desc("hits"))
        .unwrap()
        .unwrap();
    assert_eq!(first.id, Some(10));

    assert_eq!(repo.load(&7).unwrap().name, "Account 7");
    assert!(matches!(repo.load(&70), Err(RepoError::NotFound { .. })));
    assert!(repo.find(&70).unwrap().is_none());

    assert_eq!(
        repo.get_id(&ParameterSet::with("views", 30i64)).unwrap(),
        Some(3)
    );
}

#[test]
fn remote_ids_match_literally() {
    let repo = seeded();
    let mut odd = account(11);
    odd.remote_id = Some("R_%".into());
    repo.create(odd).unwrap();

    let hit = repo.find_by_remote_id(Value::from("R-3")).unwrap().unwrap();
    assert_eq!(hit.id, Some(3));
    let hit = repo.find_by_remote_id(Value::from("R_%")).unwrap().unwrap();
    assert_eq!(hit.id, Some(11));
    assert!(repo.find_by_remote_id(Value::from("R-99")).unwrap().is_none());
}

#[test]
fn counting_and_projections() {
    let repo = seeded();
    assert_eq!(repo.count_by(&ParameterSet::with("active", true)).unwrap(), 5);
    assert_eq!(
        repo.property_values("account_id", &ParameterSet::new())
            .unwrap(),
        vec![Value::Int(1), Value::Int(2)]
    );
    assert_eq!(
        repo.property_values("other.name", &ParameterSet::with("account_id", 1).asc("hits"))
            .unwrap(),
        vec![Value::from("other-1"), Value::from("other-0")]
    );
    assert_eq!(repo.field_value(&4, "score").unwrap(), Value::Null);
    assert_eq!(repo.field_value(&4, "views").unwrap(), Value::Long(40));
    assert_eq!(repo.field_value(&3, "other.name").unwrap(), Value::Null);
    assert!(matches!(
        repo.field_value(&99, "views"),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn paging_through_results() {
    let repo = seeded();
    let mut paginator = Paginator::new(0, 4, 1).unwrap();
    let params = ParameterSet::new().asc("id");

    let page = repo.find_page(&params, &mut paginator).unwrap();
    assert_eq!(ids(&page.items), vec![1, 2, 3, 4]);
    assert_eq!(page.page_info.pages_number, 3);

    paginator.next_page();
    paginator.next_page();
    let page = repo.find_page(&params, &mut paginator).unwrap();
    assert_eq!(ids(&page.items), vec![9, 10]);
    assert_eq!(page.page_info.page, 3);
}

#[test]
fn batch_updates_touch_every_match() {
    let repo = seeded();
    let n = repo
        .batch_update("active", Value::Bool(false), &ParameterSet::with("account_id", 1))
        .unwrap();
    assert_eq!(n, 5);
    assert_eq!(repo.count_by(&ParameterSet::with("active", true)).unwrap(), 3);

    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), Value::from("renamed"));
    fields.insert("other.name".to_string(), Value::from("nested"));
    let n = repo
        .batch_update_fields(&fields, &ParameterSet::with("hits", Condition::is_in([1, 2])))
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(repo.load(&2).unwrap().other.unwrap().name, "nested");

    // a failing write leaves every record untouched
    let err = repo.batch_update("views", Value::from("x"), &ParameterSet::new());
    assert!(matches!(
        err,
        Err(RepoError::Compile(CompileError::TypeMismatch { .. }))
    ));
    assert_eq!(repo.load(&1).unwrap().views, 10);

    // null hop on write
    let err = repo.batch_update("other.name", Value::from("x"), &ParameterSet::with("hits", 3));
    assert!(matches!(
        err,
        Err(RepoError::Compile(CompileError::NullReference(_)))
    ));
}

#[test]
fn counters_preserve_their_type() {
    let repo = seeded();
    assert_eq!(repo.increase_counter(&1, "hits").unwrap(), Value::Int(2));
    assert_eq!(repo.increase_counter(&1, "views").unwrap(), Value::Long(11));
    assert_eq!(repo.decrease_counter(&2, "likes").unwrap(), Value::Long(1));
    assert_eq!(repo.load(&1).unwrap().hits, 2);

    assert!(matches!(
        repo.increase_counter(&1, "likes"),
        Err(RepoError::InvalidCounter { reason: "value is null", .. })
    ));
    assert!(matches!(
        repo.increase_counter(&1, "name"),
        Err(RepoError::InvalidCounter { .. })
    ));

    repo.batch_update("hits", Value::Int(i32::MAX), &ParameterSet::with("hits", 5))
        .unwrap();
    assert!(matches!(
        repo.increase_counter(&5, "hits"),
        Err(RepoError::InvalidCounter { reason: "overflow", .. })
    ));
    assert_eq!(repo.load(&5).unwrap().hits, i32::MAX);
}

#[test]
fn save_update_delete_and_reload() {
    let repo = seeded();
    let mut a = repo.load(&3).unwrap();
    a.name = "changed".into();
    repo.save(a.clone()).unwrap();
    assert_eq!(repo.reload(&a).unwrap().name, "changed");

    let created = repo.save(account(20)).unwrap();
    assert_eq!(created.id, Some(11));

    let mut ghost = account(21);
    ghost.id = Some(500);
    assert!(matches!(repo.update(ghost.clone()), Err(RepoError::NotFound { .. })));
    repo.create(ghost.clone()).unwrap();
    assert!(matches!(repo.create(ghost), Err(RepoError::Conflict { .. })));

    repo.delete(&a).unwrap();
    assert!(repo.find(&3).unwrap().is_none());
    assert!(matches!(repo.delete_by_id(&3), Err(RepoError::NotFound { .. })));

    assert!(matches!(repo.delete(&account(1)), Err(RepoError::NotFound { .. })));

    let removed = repo
        .delete_where(&ParameterSet::with("account_id", 2))
        .unwrap();
    // 6..=10 plus the two accounts created above
    assert_eq!(removed, 7);
    assert_eq!(repo.delete_all().unwrap(), 4);
    assert_eq!(repo.count().unwrap(), 0);
}

#[test]
fn in_transaction_runs_the_scope() {
    let repo = seeded();
    let total = repo
        .in_transaction(|r| {
            r.delete_by_id(&1)?;
            r.count()
        })
        .unwrap();
    assert_eq!(total, 9);
}

#[derive(Default)]
struct Recorder {
    tag: &'static str,
    events: Arc<Mutex<Vec<String>>>,
}

impl EntityListener<Account> for Recorder {
    fn before_create(&self, entity: &mut Account) {
        if entity.name.is_empty() {
            entity.name = format!("named by {}", self.tag);
        }
        self.events.lock().unwrap().push(format!("{}:before_create", self.tag));
    }

    fn after_create(&self, _entity: &Account) {
        self.events.lock().unwrap().push(format!("{}:after_create", self.tag));
    }

    fn before_update(&self, _entity: &mut Account) {
        self.events.lock().unwrap().push(format!("{}:before_update", self.tag));
    }

    fn after_delete(&self, entity: &Account) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:after_delete:{}", self.tag, entity.id.unwrap_or(0)));
    }
}

#[test]
fn listeners_run_in_registration_order_and_feed_validation() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let listeners = ListenerRegistry::<Account>::new()
        .with(Arc::new(Recorder {
            tag: "a",
            events: events.clone(),
        }))
        .with(Arc::new(Recorder {
            tag: "b",
            events: events.clone(),
        }));
    let validator = Validator::<Account>::new().required("name");
    let repo = InMemoryRepository::new(listeners, validator);

    let blank = Account::default();
    let saved = repo.create(blank).unwrap();
    assert_eq!(saved.name, "named by a");
    assert_eq!(repo.load(&1).unwrap().name, "named by a");

    repo.delete_by_id(&1).unwrap();
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "a:before_create",
            "b:before_create",
            "a:after_create",
            "b:after_create",
            "a:after_delete:1",
            "b:after_delete:1",
        ]
    );

    // bulk deletes skip listeners
    repo.create(account(1)).unwrap();
    events.lock().unwrap().clear();
    repo.delete_all().unwrap();
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn validation_rejects_before_storing() {
    let validator = Validator::<Account>::new()
        .required("name")
        .required("other.name")
        .with(|a: &Account| {
            if a.hits < 0 {
                Err("hits must not be negative".to_string())
            } else {
                Ok(())
            }
        });
    let repo: InMemoryRepository<Account> = InMemoryRepository::new(ListenerRegistry::new(), validator);

    let mut a = account(1);
    a.name = "   ".into();
    let err = repo.create(a).unwrap_err();
    assert!(matches!(&err, RepoError::Validation { message, .. } if message == "name must not be blank"));
    assert!(err.is_recoverable());

    let err = repo.create(account(3)).unwrap_err();
    assert!(matches!(&err, RepoError::Validation { message, .. } if message == "other.name is required"));

    let mut a = account(1);
    a.hits = -1;
    assert!(matches!(repo.create(a), Err(RepoError::Validation { .. })));
    assert_eq!(repo.count().unwrap(), 0);

    let saved = repo.create(account(1)).unwrap();
    let mut broken = saved.clone();
    broken.other = Some(Other {
        id: 1,
        name: String::new(),
        rank: None,
    });
    assert!(matches!(repo.update(broken), Err(RepoError::Validation { .. })));
    assert_eq!(repo.reload(&saved).unwrap(), saved);
}
