//! Integration tests for `SqliteStore` against an in-memory database.

use lineage_core::{
  DomainError, Error as CoreError,
  event::{
    ChildLinked, ChildUnlinked, Deletion, DomainEvent, EventQuery,
    ExpectedVersion, FieldChanges, NameAdded, NameRemoved, NewEvent, StreamType,
  },
  model::{
    CitationData, EntityData, FamilyData, Gender, PersonData, PersonNameData,
    Record, SourceData,
  },
  search::{SearchMode, SearchQuery},
  store::{
    EventStore, ListOptions, ProjectionEngine, ReadModelStore, SnapshotStore,
    SortOrder,
  },
};
use serde_json::json;
use uuid::Uuid;

use crate::{Error, SqliteStore, tables};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn core(err: &Error) -> &CoreError {
  err.as_core().expect("expected a domain error")
}

fn named(given: &str, surname: &str) -> PersonData {
  PersonData {
    given_name: Some(given.into()),
    surname: Some(surname.into()),
    ..Default::default()
  }
}

async fn add_person(s: &SqliteStore, data: PersonData) -> Uuid {
  let id = Uuid::new_v4();
  s.append(
    id,
    StreamType::Person,
    vec![DomainEvent::PersonCreated(data).into()],
    ExpectedVersion::NoStream,
  )
  .await
  .unwrap();
  id
}

/// Create a family of `father` and `mother` with `children` linked, in one
/// batch.
async fn add_family(
  s: &SqliteStore,
  father: Option<Uuid>,
  mother: Option<Uuid>,
  children: &[Uuid],
) -> Uuid {
  let id = Uuid::new_v4();
  let mut events: Vec<NewEvent> = vec![
    DomainEvent::FamilyCreated(FamilyData {
      partner1_id: father,
      partner2_id: mother,
      ..Default::default()
    })
    .into(),
  ];
  events.extend(children.iter().map(|&child_id| {
    NewEvent::from(DomainEvent::ChildLinkedToFamily(ChildLinked {
      child_id,
      relationship_to_father: Some("birth".into()),
      relationship_to_mother: Some("birth".into()),
      sequence: None,
    }))
  }));
  s.append(id, StreamType::Family, events, ExpectedVersion::NoStream)
    .await
    .unwrap();
  id
}

async fn update_person(
  s: &SqliteStore,
  id: Uuid,
  changes: serde_json::Value,
) -> Result<Vec<lineage_core::event::StoredEvent>, Error> {
  let version = s.get_stream_version(id).await.unwrap();
  s.append(
    id,
    StreamType::Person,
    vec![DomainEvent::PersonUpdated(FieldChanges::from_json(changes)).into()],
    ExpectedVersion::Exact(version),
  )
  .await
}

async fn all<D: EntityData>(s: &SqliteStore) -> Vec<Record<D>> {
  let options = ListOptions { limit: 1000, ..Default::default() };
  s.list::<D>(&options).await.unwrap().items
}

// ─── Event store ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_append_creates_stream_and_projects_person() {
  let s = store().await;
  let id = Uuid::new_v4();

  let stored = s
    .append(
      id,
      StreamType::Person,
      vec![DomainEvent::PersonCreated(named("John", "Doe")).into()],
      ExpectedVersion::NoStream,
    )
    .await
    .unwrap();

  assert_eq!(stored.len(), 1);
  assert_eq!(stored[0].version, 1);
  assert_eq!(stored[0].event_type, "PersonCreated");
  assert_eq!(s.get_stream_version(id).await.unwrap(), 1);

  let stream = s.get_stream(id).await.unwrap().unwrap();
  assert_eq!(stream.stream_type, StreamType::Person);

  let people = all::<PersonData>(&s).await;
  assert_eq!(people.len(), 1);
  assert_eq!(people[0].id, id);
  assert_eq!(people[0].data.full_name, "John Doe");
  assert_eq!(people[0].version, 1);
}

#[tokio::test]
async fn stale_expected_version_conflicts() {
  let s = store().await;
  let id = add_person(&s, named("John", "Doe")).await;

  let err = update_person_at(&s, id, ExpectedVersion::Exact(0)).await.unwrap_err();
  assert!(matches!(
    core(&err),
    CoreError::ConcurrencyConflict { stream_id, expected: ExpectedVersion::Exact(0), actual: 1 }
      if *stream_id == id
  ));
  assert_eq!(s.get_stream_version(id).await.unwrap(), 1);

  let stored = update_person_at(&s, id, ExpectedVersion::Exact(1)).await.unwrap();
  assert_eq!(stored[0].version, 2);

  let versions: Vec<_> =
    s.read_stream(id).await.unwrap().iter().map(|e| e.version).collect();
  assert_eq!(versions, vec![1, 2]);
}

async fn update_person_at(
  s: &SqliteStore,
  id: Uuid,
  expected: ExpectedVersion,
) -> Result<Vec<lineage_core::event::StoredEvent>, Error> {
  s.append(
    id,
    StreamType::Person,
    vec![
      DomainEvent::PersonUpdated(FieldChanges::from_json(json!({
        "nickname": "Jack"
      })))
      .into(),
    ],
    expected,
  )
  .await
}

#[tokio::test]
async fn no_stream_rejects_existing_stream() {
  let s = store().await;
  let id = add_person(&s, named("John", "Doe")).await;

  let err = s
    .append(
      id,
      StreamType::Person,
      vec![DomainEvent::PersonCreated(named("Jane", "Doe")).into()],
      ExpectedVersion::NoStream,
    )
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::ConcurrencyConflict { actual: 1, .. }));

  let person = s.get::<PersonData>(id).await.unwrap().unwrap();
  assert_eq!(person.data.full_name, "John Doe");
}

#[tokio::test]
async fn n_appends_give_gapless_versions() {
  let s = store().await;
  let id = add_person(&s, named("Ann", "Lee")).await;
  for v in 1..5 {
    update_person_at(&s, id, ExpectedVersion::Exact(v)).await.unwrap();
  }

  assert_eq!(s.get_stream_version(id).await.unwrap(), 5);
  let versions: Vec<_> =
    s.read_stream(id).await.unwrap().iter().map(|e| e.version).collect();
  assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn unknown_streams_are_empty() {
  let s = store().await;
  let id = Uuid::new_v4();
  assert_eq!(s.get_stream_version(id).await.unwrap(), 0);
  assert!(s.read_stream(id).await.unwrap().is_empty());
  assert!(s.get_stream(id).await.unwrap().is_none());
  assert!(s.get_event(id).await.unwrap().is_none());
}

#[tokio::test]
async fn positions_increase_across_interleaved_streams() {
  let s = store().await;
  let a = add_person(&s, named("Ann", "Lee")).await;
  let b = add_person(&s, named("Bob", "Lee")).await;
  update_person_at(&s, a, ExpectedVersion::Exact(1)).await.unwrap();
  update_person_at(&s, b, ExpectedVersion::Exact(1)).await.unwrap();
  update_person_at(&s, a, ExpectedVersion::Exact(2)).await.unwrap();

  let log = s.read_all(0, 100).await.unwrap();
  let positions: Vec<_> = log.iter().map(|e| e.position).collect();
  assert_eq!(positions, vec![1, 2, 3, 4, 5]);
  let streams: Vec<_> = log.iter().map(|e| e.stream_id).collect();
  assert_eq!(streams, vec![a, b, a, b, a]);

  // Same cursor, no writes: same answer.
  assert_eq!(s.read_all(0, 100).await.unwrap(), log);

  let tail = s.read_all(3, 1).await.unwrap();
  assert_eq!(tail.len(), 1);
  assert_eq!(tail[0].position, 4);
  assert!(s.read_all(5, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn stored_events_round_trip_through_the_log() {
  let s = store().await;
  let id = Uuid::new_v4();
  let metadata = json!({ "user": "archivist", "source": "import" });

  let stored = s
    .append(
      id,
      StreamType::Source,
      vec![NewEvent::with_metadata(
        DomainEvent::SourceCreated(SourceData {
          title: "Parish register".into(),
          ..Default::default()
        }),
        metadata.clone(),
      )],
      ExpectedVersion::NoStream,
    )
    .await
    .unwrap();

  let fetched = s.get_event(stored[0].event_id).await.unwrap().unwrap();
  assert_eq!(fetched, stored[0]);
  assert_eq!(fetched.metadata, Some(metadata));
  assert!(matches!(fetched.decode().unwrap(), DomainEvent::SourceCreated(_)));
}

#[tokio::test]
async fn read_filtered_applies_filters_and_pages() {
  let s = store().await;
  let a = add_person(&s, named("Ann", "Lee")).await;
  add_person(&s, named("Bob", "Lee")).await;
  update_person_at(&s, a, ExpectedVersion::Exact(1)).await.unwrap();
  add_family(&s, None, None, &[a]).await;

  let query = EventQuery {
    event_types: vec!["PersonCreated".into(), "PersonUpdated".into()],
    limit: 2,
    ..Default::default()
  };
  let page = s.read_filtered(&query).await.unwrap();
  assert_eq!(page.total_count, 3);
  assert_eq!(page.events.len(), 2);
  assert!(page.has_more);

  let next = EventQuery {
    after_position: page.events[1].position,
    ..query.clone()
  };
  let page = s.read_filtered(&next).await.unwrap();
  assert_eq!(page.total_count, 3);
  assert_eq!(page.events.len(), 1);
  assert!(!page.has_more);

  let families = EventQuery {
    stream_type: Some(StreamType::Family),
    ..Default::default()
  };
  let page = s.read_filtered(&families).await.unwrap();
  assert_eq!(page.total_count, 2);
  assert!(page.events.iter().all(|e| e.stream_type == StreamType::Family));

  let future = EventQuery {
    since: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
    ..Default::default()
  };
  assert_eq!(s.read_filtered(&future).await.unwrap().total_count, 0);
}

#[tokio::test]
async fn oversized_page_is_capped_and_store_stays_usable() {
  let s = store().await;
  add_person(&s, named("Ann", "Lee")).await;

  let query = EventQuery { limit: i64::MAX as usize, ..Default::default() };
  let page = s.read_filtered(&query).await.unwrap();
  assert_eq!(page.events.len(), 1);
  assert!(!page.has_more);

  let query = EventQuery { limit: usize::MAX, ..Default::default() };
  assert_eq!(s.read_filtered(&query).await.unwrap().events.len(), 1);
  assert_eq!(s.read_all(0, usize::MAX).await.unwrap().len(), 1);

  add_person(&s, named("Bob", "Lee")).await;
  assert_eq!(s.get_max_position().await.unwrap(), 2);
}

#[tokio::test]
async fn events_must_match_the_stream_type() {
  let s = store().await;
  let id = Uuid::new_v4();

  let err = s
    .append(
      id,
      StreamType::Person,
      vec![DomainEvent::FamilyCreated(FamilyData::default()).into()],
      ExpectedVersion::NoStream,
    )
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::StreamTypeMismatch { .. }));
  assert!(s.get_stream(id).await.unwrap().is_none());

  // An existing stream keeps its type.
  let person = add_person(&s, named("Ann", "Lee")).await;
  let err = s
    .append(
      person,
      StreamType::Family,
      vec![DomainEvent::FamilyCreated(FamilyData::default()).into()],
      ExpectedVersion::Exact(1),
    )
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::StreamTypeMismatch { .. }));
}

#[tokio::test]
async fn empty_batch_checks_version_and_appends_nothing() {
  let s = store().await;
  let id = add_person(&s, named("Ann", "Lee")).await;

  let stored = s
    .append(id, StreamType::Person, Vec::new(), ExpectedVersion::Exact(1))
    .await
    .unwrap();
  assert!(stored.is_empty());

  let err = s
    .append(id, StreamType::Person, Vec::new(), ExpectedVersion::Exact(7))
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::ConcurrencyConflict { .. }));
  assert_eq!(s.get_max_position().await.unwrap(), 1);
}

#[tokio::test]
async fn failing_projection_rolls_back_the_whole_batch() {
  let s = store().await;
  let id = Uuid::new_v4();

  let err = s
    .append(
      id,
      StreamType::Person,
      vec![
        DomainEvent::PersonCreated(named("Ann", "Lee")).into(),
        DomainEvent::PersonUpdated(FieldChanges::from_json(json!({
          "gender": 42
        })))
        .into(),
      ],
      ExpectedVersion::NoStream,
    )
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::InvalidChange { field, .. } if field == "gender"));

  assert_eq!(s.get_stream_version(id).await.unwrap(), 0);
  assert!(s.get_stream(id).await.unwrap().is_none());
  assert!(s.get::<PersonData>(id).await.unwrap().is_none());
  assert_eq!(s.get_max_position().await.unwrap(), 0);

  // The position sequence is not consumed by the rolled-back batch.
  add_person(&s, named("Bob", "Lee")).await;
  assert_eq!(s.get_max_position().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_admit_exactly_one_writer() {
  let s = store().await;
  let id = Uuid::new_v4();

  let tasks: Vec<_> = (0..8)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move {
        s.append(
          id,
          StreamType::Person,
          vec![DomainEvent::PersonCreated(named(&format!("P{i}"), "Race")).into()],
          ExpectedVersion::NoStream,
        )
        .await
      })
    })
    .collect();

  let (mut ok, mut conflicts) = (0, 0);
  for task in tasks {
    match task.await.unwrap() {
      Ok(_) => ok += 1,
      Err(e) if matches!(e.as_core(), Some(CoreError::ConcurrencyConflict { .. })) => {
        conflicts += 1
      }
      Err(e) => panic!("unexpected error: {e}"),
    }
  }
  assert_eq!((ok, conflicts), (1, 7));
  assert_eq!(s.read_stream(id).await.unwrap().len(), 1);
}

// ─── Projections ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn person_update_patches_fields_and_derived_values() {
  let s = store().await;
  let id = add_person(&s, named("John", "Doe")).await;

  update_person(
    &s,
    id,
    json!({ "surname": "Smith", "birth_date": "ABT 12 MAR 1850", "full_name": "ignored" }),
  )
  .await
  .unwrap();

  let person = s.get::<PersonData>(id).await.unwrap().unwrap();
  assert_eq!(person.version, 2);
  assert_eq!(person.data.given_name.as_deref(), Some("John"));
  assert_eq!(person.data.full_name, "John Smith");
  assert_eq!(person.data.birth_sort, Some(18500312));
  assert!(person.updated_at >= person.created_at);

  let names = s.list_related::<PersonNameData>("person_id", id).await.unwrap();
  assert_eq!(names.len(), 1);
  assert!(names[0].data.is_primary);
  assert_eq!(names[0].data.full_name, "John Smith");
  assert_eq!(names[0].data.soundex_surname.as_deref(), Some("S530"));
}

#[tokio::test]
async fn child_linked_updates_count_and_pedigree() {
  let s = store().await;
  let father = add_person(&s, named("John", "Doe")).await;
  let mother = add_person(&s, named("Jane", "Roe")).await;
  let child = add_person(&s, named("Jim", "Doe")).await;

  let family = add_family(&s, Some(father), Some(mother), &[]).await;
  let stored = s
    .append(
      family,
      StreamType::Family,
      vec![
        DomainEvent::ChildLinkedToFamily(ChildLinked {
          child_id:               child,
          relationship_to_father: Some("birth".into()),
          relationship_to_mother: Some("birth".into()),
          sequence:               Some(1),
        })
        .into(),
      ],
      ExpectedVersion::Exact(1),
    )
    .await
    .unwrap();
  assert_eq!(stored[0].version, 2);

  let fam = s.get::<FamilyData>(family).await.unwrap().unwrap();
  assert_eq!(fam.data.child_count, 1);
  assert_eq!(fam.data.partner1_name.as_deref(), Some("John Doe"));
  assert_eq!(fam.data.partner2_name.as_deref(), Some("Jane Roe"));

  let edge = s.pedigree_edge(child).await.unwrap().unwrap();
  assert_eq!(edge.family_id, Some(family));
  assert_eq!(edge.father_id, Some(father));
  assert_eq!(edge.mother_id, Some(mother));
  assert_eq!(edge.mother_name.as_deref(), Some("Jane Roe"));

  let children = s.family_children(family).await.unwrap();
  assert_eq!(children.len(), 1);
  assert_eq!(children[0].person_id, child);
  assert_eq!(s.child_families(child).await.unwrap()[0].family_id, family);

  s.append(
    family,
    StreamType::Family,
    vec![DomainEvent::ChildUnlinkedFromFamily(ChildUnlinked { child_id: child }).into()],
    ExpectedVersion::Exact(2),
  )
  .await
  .unwrap();

  let fam = s.get::<FamilyData>(family).await.unwrap().unwrap();
  assert_eq!(fam.data.child_count, 0);
  assert!(s.pedigree_edge(child).await.unwrap().is_none());
  assert!(s.family_children(family).await.unwrap().is_empty());
}

#[tokio::test]
async fn renaming_a_person_refreshes_denormalized_names() {
  let s = store().await;
  let father = add_person(&s, named("John", "Doe")).await;
  let child = add_person(&s, named("Jim", "Doe")).await;
  let family = add_family(&s, Some(father), None, &[child]).await;

  update_person(&s, father, json!({ "given_name": "Jonathan" }))
    .await
    .unwrap();

  let fam = s.get::<FamilyData>(family).await.unwrap().unwrap();
  assert_eq!(fam.data.partner1_name.as_deref(), Some("Jonathan Doe"));
  let edge = s.pedigree_edge(child).await.unwrap().unwrap();
  assert_eq!(edge.father_name.as_deref(), Some("Jonathan Doe"));
}

#[tokio::test]
async fn changing_partners_moves_children_edges() {
  let s = store().await;
  let first = add_person(&s, named("John", "Doe")).await;
  let second = add_person(&s, named("Jack", "Doe")).await;
  let child = add_person(&s, named("Jim", "Doe")).await;
  let family = add_family(&s, Some(first), None, &[child]).await;

  s.append(
    family,
    StreamType::Family,
    vec![
      DomainEvent::FamilyUpdated(FieldChanges::from_json(json!({
        "partner1_id": second
      })))
      .into(),
    ],
    ExpectedVersion::Exact(2),
  )
  .await
  .unwrap();

  let edge = s.pedigree_edge(child).await.unwrap().unwrap();
  assert_eq!(edge.father_id, Some(second));
  assert_eq!(edge.father_name.as_deref(), Some("Jack Doe"));
}

#[tokio::test]
async fn person_deleted_removes_rows_but_keeps_history() {
  let s = store().await;
  let id = add_person(&s, named("John", "Doe")).await;

  s.append(
    id,
    StreamType::Person,
    vec![
      DomainEvent::PersonDeleted(Deletion { reason: Some("duplicate".into()) })
        .into(),
    ],
    ExpectedVersion::Exact(1),
  )
  .await
  .unwrap();

  assert!(s.get::<PersonData>(id).await.unwrap().is_none());
  assert!(s.get::<PersonNameData>(id).await.unwrap().is_none());
  let history = s.read_stream(id).await.unwrap();
  let types: Vec<_> = history.iter().map(|e| e.event_type.as_str()).collect();
  assert_eq!(types, vec!["PersonCreated", "PersonDeleted"]);
}

#[tokio::test]
async fn family_deleted_drops_links_and_edges() {
  let s = store().await;
  let father = add_person(&s, named("John", "Doe")).await;
  let child = add_person(&s, named("Jim", "Doe")).await;
  let family = add_family(&s, Some(father), None, &[child]).await;

  s.append(
    family,
    StreamType::Family,
    vec![DomainEvent::FamilyDeleted(Deletion::default()).into()],
    ExpectedVersion::Exact(2),
  )
  .await
  .unwrap();

  assert!(s.get::<FamilyData>(family).await.unwrap().is_none());
  assert!(s.family_children(family).await.unwrap().is_empty());
  assert!(s.pedigree_edge(child).await.unwrap().is_none());
}

#[tokio::test]
async fn primary_name_follows_name_variants() {
  let s = store().await;
  let id = add_person(&s, named("Mary", "Smith")).await;
  let married = Uuid::new_v4();

  s.append(
    id,
    StreamType::Person,
    vec![
      DomainEvent::NameAdded(NameAdded {
        name_id: married,
        name:    PersonNameData {
          given_name: Some("Mary".into()),
          surname: Some("Jones".into()),
          name_type: Some("married".into()),
          is_primary: true,
          ..Default::default()
        },
      })
      .into(),
    ],
    ExpectedVersion::Exact(1),
  )
  .await
  .unwrap();

  let person = s.get::<PersonData>(id).await.unwrap().unwrap();
  assert_eq!(person.data.full_name, "Mary Jones");
  assert_eq!(person.version, 2);

  let names = s.list_related::<PersonNameData>("person_id", id).await.unwrap();
  let primaries: Vec<_> = names.iter().filter(|n| n.data.is_primary).collect();
  assert_eq!(names.len(), 2);
  assert_eq!(primaries.len(), 1);
  assert_eq!(primaries[0].id, married);

  // The primary name cannot be removed; the birth name can.
  s.append(
    id,
    StreamType::Person,
    vec![
      DomainEvent::NameRemoved(NameRemoved { name_id: married }).into(),
      DomainEvent::NameRemoved(NameRemoved { name_id: id }).into(),
    ],
    ExpectedVersion::Exact(2),
  )
  .await
  .unwrap();

  let names = s.list_related::<PersonNameData>("person_id", id).await.unwrap();
  assert_eq!(names.len(), 1);
  assert_eq!(names[0].id, married);
}

#[tokio::test]
async fn generic_kinds_follow_create_update_delete() {
  let s = store().await;
  let source = Uuid::new_v4();
  let citation = Uuid::new_v4();
  let person = add_person(&s, named("Ann", "Lee")).await;

  s.append(
    source,
    StreamType::Source,
    vec![
      DomainEvent::SourceCreated(SourceData {
        title: "1850 census".into(),
        ..Default::default()
      })
      .into(),
    ],
    ExpectedVersion::NoStream,
  )
  .await
  .unwrap();
  s.append(
    citation,
    StreamType::Citation,
    vec![
      DomainEvent::CitationCreated(CitationData {
        source_id: source,
        person_id: Some(person),
        page: Some("p. 12".into()),
        ..Default::default()
      })
      .into(),
      DomainEvent::CitationUpdated(FieldChanges::from_json(json!({ "quality": 3 })))
        .into(),
    ],
    ExpectedVersion::NoStream,
  )
  .await
  .unwrap();

  let cited = s.list_related::<CitationData>("source_id", source).await.unwrap();
  assert_eq!(cited.len(), 1);
  assert_eq!(cited[0].data.quality, Some(3));
  assert_eq!(cited[0].version, 2);

  s.append(
    citation,
    StreamType::Citation,
    vec![DomainEvent::CitationDeleted(Deletion::default()).into()],
    ExpectedVersion::Exact(2),
  )
  .await
  .unwrap();
  assert!(s.get::<CitationData>(citation).await.unwrap().is_none());
}

#[tokio::test]
async fn reapplying_an_event_is_a_no_op() {
  let s = store().await;
  let id = add_person(&s, named("John", "Doe")).await;
  update_person(&s, id, json!({ "surname": "Smith" })).await.unwrap();
  let before = s.get::<PersonData>(id).await.unwrap().unwrap();

  // Replaying the creation must not roll the row back to "John Doe".
  for event in s.read_stream(id).await.unwrap() {
    s.apply(&event).await.unwrap();
  }

  let after = s.get::<PersonData>(id).await.unwrap().unwrap();
  assert_eq!(after, before);
}

// ─── Rebuild ─────────────────────────────────────────────────────────────────

/// A small but complete tree: three generations, a renamed person, a name
/// variant, a deleted person and some evidence.
async fn populate(s: &SqliteStore) -> (Uuid, Uuid) {
  let gf = add_person(s, named("Walter", "Doe")).await;
  let gm = add_person(s, named("Edith", "Moss")).await;
  let dad = add_person(s, named("John", "Doe")).await;
  let mum = add_person(s, named("Jane", "Roe")).await;
  let me = add_person(s, named("Jim", "Doe")).await;
  add_family(s, Some(gf), Some(gm), &[dad]).await;
  add_family(s, Some(dad), Some(mum), &[me]).await;

  update_person(s, dad, json!({ "given_name": "Jonathan", "birth_date": "1850" }))
    .await
    .unwrap();
  s.append(
    mum,
    StreamType::Person,
    vec![
      DomainEvent::NameAdded(NameAdded {
        name_id: Uuid::new_v4(),
        name:    PersonNameData {
          given_name: Some("Jane".into()),
          surname: Some("Doe".into()),
          name_type: Some("married".into()),
          ..Default::default()
        },
      })
      .into(),
    ],
    ExpectedVersion::Exact(1),
  )
  .await
  .unwrap();

  let gone = add_person(s, named("Temp", "Person")).await;
  s.append(
    gone,
    StreamType::Person,
    vec![DomainEvent::PersonDeleted(Deletion::default()).into()],
    ExpectedVersion::Exact(1),
  )
  .await
  .unwrap();

  let source = Uuid::new_v4();
  s.append(
    source,
    StreamType::Source,
    vec![
      DomainEvent::SourceCreated(SourceData {
        title: "Family bible".into(),
        ..Default::default()
      })
      .into(),
    ],
    ExpectedVersion::NoStream,
  )
  .await
  .unwrap();

  (me, dad)
}

#[derive(Debug, PartialEq)]
struct ReadModelState {
  persons:  Vec<Record<PersonData>>,
  names:    Vec<Record<PersonNameData>>,
  families: Vec<Record<FamilyData>>,
  sources:  Vec<Record<SourceData>>,
  edges:    Vec<Option<lineage_core::pedigree::PedigreeEdge>>,
  children: Vec<Vec<lineage_core::model::FamilyChild>>,
}

async fn state(s: &SqliteStore) -> ReadModelState {
  let persons = all::<PersonData>(s).await;
  let families = all::<FamilyData>(s).await;
  let mut edges = Vec::new();
  for p in &persons {
    edges.push(s.pedigree_edge(p.id).await.unwrap());
  }
  let mut children = Vec::new();
  for f in &families {
    children.push(s.family_children(f.id).await.unwrap());
  }
  ReadModelState {
    names: all::<PersonNameData>(s).await,
    sources: all::<SourceData>(s).await,
    persons,
    families,
    edges,
    children,
  }
}

#[tokio::test]
async fn rebuild_from_zero_reproduces_live_state() {
  let s = store().await;
  populate(&s).await;
  let live = state(&s).await;
  let total = s.get_max_position().await.unwrap();

  let report = s.rebuild(0).await.unwrap();
  assert_eq!(report.applied as i64, total);
  assert_eq!(report.skipped, 0);
  assert_eq!(report.last_position, total);

  assert_eq!(state(&s).await, live);
}

#[tokio::test]
async fn rebuild_pages_through_the_log() {
  let s = store().await.with_rebuild_page_size(3);
  populate(&s).await;
  let live = state(&s).await;

  let report = s.rebuild(0).await.unwrap();
  assert_eq!(report.last_position, s.get_max_position().await.unwrap());
  assert_eq!(state(&s).await, live);
}

#[tokio::test]
async fn rebuild_skips_events_it_cannot_decode() {
  let s = store().await;
  let id = add_person(&s, named("John", "Doe")).await;
  let stream = crate::encode::encode_uuid(id);

  s.writer
    .call(move |conn| {
      conn.execute(
        "INSERT INTO events (event_id, stream_id, stream_type, version,
                             event_type, payload, recorded_at)
         VALUES (?1, ?2, 'Person', 2, 'PersonTeleported', X'7B7D',
                 '2024-01-01T00:00:00.000000Z'),
                (?3, ?2, 'Person', 3, 'PersonUpdated', X'6E6F7065',
                 '2024-01-01T00:00:00.000000Z')",
        rusqlite::params![
          Uuid::new_v4().to_string(),
          stream,
          Uuid::new_v4().to_string(),
        ],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let report = s.rebuild(0).await.unwrap();
  assert_eq!(report.applied, 1);
  assert_eq!(report.skipped, 2);
  assert_eq!(report.last_position, 3);

  let person = s.get::<PersonData>(id).await.unwrap().unwrap();
  assert_eq!(person.data.full_name, "John Doe");
}

#[tokio::test]
async fn resume_rebuild_continues_from_checkpoint() {
  let s = store().await;
  populate(&s).await;
  let first = s.rebuild(0).await.unwrap();

  let late = add_person(&s, named("Late", "Comer")).await;
  update_person(&s, late, json!({ "nickname": "LC" })).await.unwrap();
  let live = state(&s).await;

  let resumed = s.resume_rebuild().await.unwrap();
  assert_eq!(resumed.applied, 2);
  assert_eq!(resumed.last_position, first.last_position + 2);
  assert_eq!(state(&s).await, live);
}

// ─── Listings ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_sorts_pages_and_filters() {
  let s = store().await;
  for (given, status) in [("Cara", "verified"), ("Abe", "draft"), ("Bea", "verified")] {
    add_person(
      &s,
      PersonData {
        research_status: Some(status.into()),
        ..named(given, "Lee")
      },
    )
    .await;
  }

  let page = s
    .list::<PersonData>(&ListOptions {
      limit: 2,
      sort: Some("given_name".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(page.total, 3);
  let given: Vec<_> =
    page.items.iter().filter_map(|p| p.data.given_name.as_deref()).collect();
  assert_eq!(given, vec!["Abe", "Bea"]);

  let page = s
    .list::<PersonData>(&ListOptions {
      offset: 2,
      sort: Some("given_name".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(page.items.len(), 1);
  assert_eq!(page.items[0].data.given_name.as_deref(), Some("Cara"));

  let past_end = ListOptions { offset: usize::MAX, ..Default::default() };
  let page = s.list::<PersonData>(&past_end).await.unwrap();
  assert_eq!(page.total, 3);
  assert!(page.items.is_empty());

  let verified = s
    .list::<PersonData>(&ListOptions {
      status: Some("verified".into()),
      sort: Some("given_name".into()),
      order: SortOrder::Desc,
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(verified.total, 2);
  assert_eq!(verified.items[0].data.given_name.as_deref(), Some("Cara"));
}

#[tokio::test]
async fn list_rejects_unknown_sort_relation_and_status() {
  let s = store().await;

  let err = s
    .list::<PersonData>(&ListOptions {
      sort: Some("password".into()),
      ..Default::default()
    })
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::InvalidQuery(_)));

  let err = s
    .list::<SourceData>(&ListOptions {
      status: Some("open".into()),
      ..Default::default()
    })
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::InvalidQuery(_)));

  let err = s
    .list_related::<CitationData>("surname", Uuid::new_v4())
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::InvalidQuery(_)));
}

#[tokio::test]
async fn search_text_matches_secondary_entities() {
  let s = store().await;
  for title in ["1850 census", "Parish register 100%", "Census of Ireland"] {
    s.append(
      Uuid::new_v4(),
      StreamType::Source,
      vec![
        DomainEvent::SourceCreated(SourceData {
          title: title.into(),
          ..Default::default()
        })
        .into(),
      ],
      ExpectedVersion::NoStream,
    )
    .await
    .unwrap();
  }

  let hits = s.search_text::<SourceData>("census", 10).await.unwrap();
  assert_eq!(hits.len(), 2);
  let hits = s.search_text::<SourceData>("100%", 10).await.unwrap();
  assert_eq!(hits.len(), 1);
  let hits = s.search_text::<SourceData>("0%", 10).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert!(s.search_text::<SourceData>("  ", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn save_and_delete_bypass_the_log() {
  let s = store().await;
  let id = Uuid::new_v4();
  let record = Record::new(
    id,
    SourceData { title: "Imported".into(), ..Default::default() },
    1,
    crate::encode::now(),
  );

  s.save(record.clone()).await.unwrap();
  assert_eq!(s.get::<SourceData>(id).await.unwrap(), Some(record));
  assert_eq!(s.get_max_position().await.unwrap(), 0);

  assert!(s.delete::<SourceData>(id).await.unwrap());
  assert!(!s.delete::<SourceData>(id).await.unwrap());
}

#[tokio::test]
async fn saved_person_is_searchable_by_name() {
  let s = store().await;
  let id = Uuid::new_v4();
  let record =
    Record::new(id, named("Katherine", "Williams"), 1, crate::encode::now());
  s.save(record).await.unwrap();

  let hits = s
    .search_persons(&SearchQuery::text("Williams", SearchMode::Exact))
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].person.id, id);
  assert!(hits[0].matched_primary);

  let name = s.get::<PersonNameData>(id).await.unwrap().unwrap();
  assert_eq!(name.data.full_name, "Katherine Williams");
  assert!(name.data.is_primary);

  assert!(s.delete::<PersonData>(id).await.unwrap());
  assert!(s.get::<PersonNameData>(id).await.unwrap().is_none());
  assert!(
    s.search_persons(&SearchQuery::text("Williams", SearchMode::Exact))
      .await
      .unwrap()
      .is_empty()
  );
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fuzzy_search_ranks_spelling_variants() {
  let s = store().await;
  let katherine = add_person(&s, named("Katherine", "Williams")).await;
  let catherine = add_person(&s, named("Catherine", "Wilson")).await;
  add_person(&s, named("John", "Doe")).await;

  let hits = s
    .search_persons(&SearchQuery::text("Kathryn", SearchMode::Fuzzy))
    .await
    .unwrap();

  let ids: Vec<_> = hits.iter().map(|h| h.person.id).collect();
  assert_eq!(ids, vec![katherine, catherine]);
  assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn exact_search_uses_name_variants_once_per_person() {
  let s = store().await;
  let mary = add_person(&s, named("Mary", "Smith")).await;
  s.append(
    mary,
    StreamType::Person,
    vec![
      DomainEvent::NameAdded(NameAdded {
        name_id: Uuid::new_v4(),
        name:    PersonNameData {
          given_name: Some("Mary".into()),
          surname: Some("Jones".into()),
          ..Default::default()
        },
      })
      .into(),
    ],
    ExpectedVersion::Exact(1),
  )
  .await
  .unwrap();

  let hits = s
    .search_persons(&SearchQuery::text("jones", SearchMode::Exact))
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].person.data.full_name, "Mary Smith");
  assert!(!hits[0].matched_primary);

  let hits = s
    .search_persons(&SearchQuery::text("Mary", SearchMode::Exact))
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert!(hits[0].matched_primary);
}

#[tokio::test]
async fn phonetic_search_finds_sound_alikes() {
  let s = store().await;
  let smyth = add_person(&s, named("John", "Smyth")).await;
  add_person(&s, named("John", "Brown")).await;

  let hits = s
    .search_persons(&SearchQuery::text("Smith", SearchMode::Phonetic))
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].person.id, smyth);
}

#[tokio::test]
async fn search_filters_combine_with_text() {
  let s = store().await;
  let early = add_person(
    &s,
    PersonData {
      birth_date: Some("12 MAR 1850".into()),
      birth_place: Some("Cork, Ireland".into()),
      gender: Gender::Female,
      ..named("Ann", "Lee")
    },
  )
  .await;
  add_person(
    &s,
    PersonData { birth_date: Some("1890".into()), ..named("Ann", "Lee") },
  )
  .await;

  let query = SearchQuery {
    text: Some("Lee".into()),
    birth_year_min: Some(1840),
    birth_year_max: Some(1850),
    ..Default::default()
  };
  let hits = s.search_persons(&query).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].person.id, early);

  let by_place = SearchQuery { place: Some("cork".into()), ..Default::default() };
  assert_eq!(s.search_persons(&by_place).await.unwrap().len(), 1);

  assert!(s.search_persons(&SearchQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn exact_search_folds_accented_case() {
  let s = store().await;
  let zola = add_person(&s, named("Émile", "Zola")).await;
  add_person(&s, named("Emil", "Nolde")).await;

  let hits = s
    .search_persons(&SearchQuery::text("émile", SearchMode::Exact))
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].person.id, zola);

  let hits = s
    .search_persons(&SearchQuery::text("ZOLA", SearchMode::Exact))
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn out_of_range_year_is_rejected_and_store_stays_usable() {
  let s = store().await;
  add_person(
    &s,
    PersonData { birth_date: Some("1850".into()), ..named("Ann", "Lee") },
  )
  .await;

  for query in [
    SearchQuery { birth_year_min: Some(i64::MAX / 1000), ..Default::default() },
    SearchQuery { birth_year_max: Some(i64::MAX), ..Default::default() },
    SearchQuery { death_year_min: Some(i64::MIN), ..Default::default() },
  ] {
    let err = s.search_persons(&query).await.unwrap_err();
    assert!(matches!(core(&err), CoreError::InvalidQuery(_)));
  }

  let query = SearchQuery {
    text: Some("Lee".into()),
    birth_year_min: Some(1800),
    ..Default::default()
  };
  assert_eq!(s.search_persons(&query).await.unwrap().len(), 1);
  assert_eq!(s.get_max_position().await.unwrap(), 1);
}

// ─── Pedigree & aggregations ─────────────────────────────────────────────────

#[tokio::test]
async fn ancestors_are_numbered_ahnentafel_style() {
  let s = store().await;
  let (me, dad) = populate(&s).await;

  let chart = s.ancestors(me, 5).await.unwrap();
  let numbers: Vec<_> = chart.iter().map(|n| n.ahnentafel).collect();
  assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
  assert_eq!(chart[1].person_id, dad);
  assert_eq!(chart[1].name.as_deref(), Some("Jonathan Doe"));
  assert_eq!(chart[3].generation, 2);

  assert_eq!(s.ancestors(me, 1).await.unwrap().len(), 3);

  let err = s.ancestors(Uuid::new_v4(), 3).await.unwrap_err();
  assert!(matches!(core(&err), CoreError::EntityNotFound { .. }));
}

#[tokio::test]
async fn surname_index_counts_people() {
  let s = store().await;
  for (given, surname) in
    [("John", "Doe"), ("Jane", "doe"), ("Bob", "Dunn"), ("Ann", "Smith")]
  {
    add_person(&s, named(given, surname)).await;
  }
  add_person(&s, PersonData { given_name: Some("Nobody".into()), ..Default::default() })
    .await;

  let index = s.surname_index(None).await.unwrap();
  let letters: Vec<_> =
    index.letters.iter().map(|l| (l.letter.as_str(), l.count)).collect();
  assert_eq!(letters, vec![("D", 3), ("S", 1)]);
  assert_eq!(index.surnames.len(), 3);

  let d = s.surname_index(Some("d")).await.unwrap();
  let surnames: Vec<_> =
    d.surnames.iter().map(|n| (n.surname.to_lowercase(), n.count)).collect();
  assert_eq!(surnames, vec![("doe".to_owned(), 2), ("dunn".to_owned(), 1)]);
}

#[tokio::test]
async fn place_hierarchy_drills_down() {
  let s = store().await;
  for (birth, death) in [
    ("Springfield, Illinois, USA", None),
    ("Chicago, Illinois, USA", Some("Cork, Ireland")),
  ] {
    add_person(
      &s,
      PersonData {
        birth_place: Some(birth.into()),
        death_place: death.map(Into::into),
        ..named("Ann", "Lee")
      },
    )
    .await;
  }

  let top = s.place_hierarchy(None).await.unwrap();
  let summary: Vec<_> = top.iter().map(|n| (n.name.as_str(), n.count)).collect();
  assert_eq!(summary, vec![("Ireland", 1), ("USA", 2)]);

  let states = s.place_hierarchy(Some("USA")).await.unwrap();
  assert_eq!(states.len(), 1);
  assert_eq!(states[0].full_name, "Illinois, USA");
  assert!(states[0].has_children);
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshots_record_the_log_position() {
  let s = store().await;
  add_person(&s, named("Ann", "Lee")).await;
  add_person(&s, named("Bob", "Lee")).await;

  let first = s
    .create_snapshot("before import".into(), Some("baseline".into()))
    .await
    .unwrap();
  assert_eq!(first.position, 2);

  add_person(&s, named("Cat", "Lee")).await;
  let second = s.create_snapshot("after import".into(), None).await.unwrap();
  assert_eq!(second.position, 3);

  let listed = s.list_snapshots().await.unwrap();
  let names: Vec<_> = listed.iter().map(|s| s.name.as_str()).collect();
  assert_eq!(names, vec!["after import", "before import"]);
  assert_eq!(s.get_snapshot(first.snapshot_id).await.unwrap(), Some(first.clone()));

  s.delete_snapshot(first.snapshot_id).await.unwrap();
  assert!(s.get_snapshot(first.snapshot_id).await.unwrap().is_none());
  let err = s.delete_snapshot(first.snapshot_id).await.unwrap_err();
  assert!(matches!(core(&err), CoreError::SnapshotNotFound(_)));
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[test]
fn catalogue_covers_every_data_field() {
  fn check<D: EntityData>() {
    let spec = tables::spec(D::KIND);
    let mut columns: Vec<_> = spec.columns.iter().map(|(n, _)| n.to_string()).collect();
    let mut keys = tables::data_keys::<D>();
    columns.sort();
    keys.sort();
    assert_eq!(columns, keys, "{}", spec.table);
  }
  check::<PersonData>();
  check::<PersonNameData>();
  check::<FamilyData>();
  check::<SourceData>();
  check::<CitationData>();
  check::<lineage_core::model::MediaData>();
  check::<lineage_core::model::LifeEventData>();
  check::<lineage_core::model::AttributeData>();
  check::<lineage_core::model::NoteData>();
  check::<lineage_core::model::SubmitterData>();
  check::<lineage_core::model::AssociationData>();
  check::<lineage_core::model::OrdinanceData>();
}

#[tokio::test]
async fn schema_matches_the_catalogue() {
  let s = store().await;
  for spec in tables::ALL {
    let table = spec.table;
    let mut actual: Vec<String> = s
      .reader
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names = stmt
          .query_map([], |r| r.get::<_, String>(1))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
      })
      .await
      .unwrap();
    let mut expected: Vec<String> = tables::BOOKKEEPING
      .iter()
      .map(|c| c.to_string())
      .chain(spec.columns.iter().map(|(n, _)| n.to_string()))
      .collect();
    actual.sort();
    expected.sort();
    assert_eq!(actual, expected, "{table}");
  }
}
