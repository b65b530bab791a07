use ideasbox::model::types::{Book, BookSpecimen, Content, ContentStatus, Document, Viewer};
use ideasbox::search::index::{Indexable, OwnerRef, OwnerType};
use ideasbox::storage::sqlite::SqliteStorage;

fn storage() -> SqliteStorage {
    SqliteStorage::open_in_memory().unwrap()
}

fn draft(s: &mut SqliteStorage) -> Content {
    let mut c = Content::draft("A draft content");
    s.save_content(&mut c).unwrap();
    c
}

fn deleted(s: &mut SqliteStorage) -> Content {
    let mut c = Content {
        status: ContentStatus::Deleted,
        ..Content::new("A deleted content")
    };
    s.save_content(&mut c).unwrap();
    c
}

fn published(s: &mut SqliteStorage) -> Content {
    let mut c = Content::published("A published content");
    s.save_content(&mut c).unwrap();
    c
}

#[test]
fn nothing_is_indexed_without_any_fixture() {
    let s = storage();
    assert_eq!(s.search().count().unwrap(), 0);
}

#[test]
fn draft_is_indexed_but_not_public() {
    let mut s = storage();
    draft(&mut s);
    assert_eq!(s.search().count().unwrap(), 1);
    assert_eq!(s.search().search(Some(true), None).fetch().unwrap().len(), 0);
}

#[test]
fn soft_deleted_is_indexed_but_not_public() {
    let mut s = storage();
    let c = deleted(&mut s);
    assert_eq!(s.search().count().unwrap(), 1);
    assert_eq!(s.search().search(Some(true), None).fetch().unwrap().len(), 0);

    let row = s.search().get(c.owner_ref().unwrap()).unwrap().unwrap();
    assert!(!row.public);
}

#[test]
fn published_is_indexed_and_follows_saves() {
    let mut s = storage();
    let mut c = published(&mut s);
    assert_eq!(s.search().count().unwrap(), 1);
    assert_eq!(s.search().search(Some(true), None).fetch().unwrap().len(), 1);
    assert_eq!(
        s.objects::<Content>().search("Ikinyugunyugu", None).count().unwrap(),
        0
    );

    c.title = "Ikinyugunyugu".into();
    s.save_content(&mut c).unwrap();
    assert_eq!(s.search().count().unwrap(), 1);
    assert_eq!(
        s.objects::<Content>().search("Ikinyugunyugu", None).count().unwrap(),
        1
    );
}

#[test]
fn hard_delete_is_deindexed() {
    let mut s = storage();
    let c = published(&mut s);
    assert_eq!(s.search().count().unwrap(), 1);
    assert!(s.delete_content(c.id.unwrap()).unwrap());
    assert_eq!(s.search().count().unwrap(), 0);
}

#[test]
fn search_is_case_insensitive() {
    let mut s = storage();
    let mut c = published(&mut s);
    c.title = "Ikinyugunyugu".into();
    s.save_content(&mut c).unwrap();
    assert_eq!(
        s.objects::<Content>().search("ikinyugunyugu", None).count().unwrap(),
        1
    );
    assert_eq!(
        s.objects::<Content>().search("IKINYUGUNYUGU", None).count().unwrap(),
        1
    );
}

#[test]
fn we_can_search_arabic_content() {
    let mut s = storage();
    let mut c = published(&mut s);
    c.title = "أكثر من خمسين لغة،".into();
    s.save_content(&mut c).unwrap();
    assert_eq!(
        s.objects::<Content>().search("خمسين", None).count().unwrap(),
        1
    );
    assert_eq!(
        s.objects::<Content>().search("أكثر", None).count().unwrap(),
        1
    );
}

#[test]
fn we_can_search_with_wildcard() {
    let mut s = storage();
    let mut c = published(&mut s);
    c.title = "Ikinyugunyugu".into();
    s.save_content(&mut c).unwrap();
    assert_eq!(
        s.objects::<Content>().search("Ikinyug*", None).count().unwrap(),
        1
    );
    // A prefix only matches at the start of a word.
    assert_eq!(
        s.objects::<Content>().search("nyugu*", None).count().unwrap(),
        0
    );
    // A plain term matches inside words.
    assert_eq!(
        s.objects::<Content>().search("nyugu", None).count().unwrap(),
        1
    );
}

#[test]
fn we_can_filter_search() {
    let mut s = storage();
    let mut p = published(&mut s);
    let mut d = draft(&mut s);
    p.title = "A title with the moon".into();
    s.save_content(&mut p).unwrap();
    d.title = "A moon in the title".into();
    s.save_content(&mut d).unwrap();

    let contents = || s.objects::<Content>();
    assert_eq!(contents().search("moon", None).count().unwrap(), 2);
    assert_eq!(contents().search("moon", None).published().count().unwrap(), 1);
    assert_eq!(contents().search("moon", Some(true)).count().unwrap(), 1);
    assert!(
        contents()
            .search("moon", None)
            .published()
            .contains(&p)
            .unwrap()
    );
    assert!(
        !contents()
            .search("moon", None)
            .published()
            .contains(&d)
            .unwrap()
    );
}

#[test]
fn draft_then_publish_keeps_one_row() {
    let mut s = storage();
    let mut c = draft(&mut s);
    assert_eq!(s.search().count().unwrap(), 1);
    assert!(s.search().search(Some(true), None).fetch().unwrap().is_empty());

    c.status = ContentStatus::Published;
    c.title = "Sunrise over the hills".into();
    s.save_content(&mut c).unwrap();

    assert_eq!(s.search().count().unwrap(), 1);
    let rows = s
        .search()
        .search(Some(true), Some("sunrise"))
        .fetch()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].owner, c.owner_ref().unwrap());
}

#[test]
fn all_terms_must_match() {
    let mut s = storage();
    let mut c = Content {
        summary: Some("Water and sanitation".into()),
        ..Content::published("Health guide")
    };
    s.save_content(&mut c).unwrap();

    let contents = || s.objects::<Content>();
    assert_eq!(contents().search("health water", None).count().unwrap(), 1);
    assert_eq!(contents().search("health fire", None).count().unwrap(), 0);
    assert_eq!(contents().search("sani* guide", None).count().unwrap(), 1);
}

#[test]
fn empty_query_returns_everything_in_scope() {
    let mut s = storage();
    published(&mut s);
    draft(&mut s);
    deleted(&mut s);

    assert_eq!(s.search().search(None, None).count().unwrap(), 3);
    assert_eq!(s.search().search(None, Some("")).count().unwrap(), 3);
    assert_eq!(s.search().search(Some(true), Some("  ")).count().unwrap(), 1);
    assert_eq!(s.search().search(Some(false), None).count().unwrap(), 2);
}

#[test]
fn results_can_be_counted_and_iterated_repeatedly() {
    let mut s = storage();
    published(&mut s);
    published(&mut s);
    let results = s.search().search(Some(true), Some("published"));

    assert_eq!(results.count().unwrap(), 2);
    let first: Vec<_> = (&results).into_iter().map(|r| r.unwrap()).collect();
    let second = results.fetch().unwrap();
    assert_eq!(first, second);
    assert_eq!(results.count().unwrap(), first.len());
}

#[test]
fn owner_without_indexable_text_still_gets_a_row() {
    let mut s = storage();
    let mut c = Content::draft("");
    let row = s.save_content(&mut c).unwrap();
    assert_eq!(row.text, "");
    assert_eq!(s.search().count().unwrap(), 1);
}

#[test]
fn index_text_concatenates_fields_in_order() {
    let mut s = storage();
    let mut c = Content {
        author: Some("Amina".into()),
        summary: None,
        text: Some("Body, with punctuation!".into()),
        ..Content::published("Title")
    };
    let row = s.save_content(&mut c).unwrap();
    assert_eq!(row.text, "title amina body with punctuation");
}

#[test]
fn search_is_scoped_to_the_owner_type() {
    let mut s = storage();
    let mut c = Content::published("Moon landing");
    s.save_content(&mut c).unwrap();
    let mut d = Document::new("Moon map", "en");
    s.save_document(&mut d).unwrap();
    let mut b = Book::new("Moon atlas", "en");
    s.save_book(&mut b).unwrap();

    assert_eq!(s.search().search(None, Some("moon")).count().unwrap(), 3);
    assert_eq!(s.objects::<Content>().search("moon", None).count().unwrap(), 1);
    assert_eq!(s.objects::<Document>().search("moon", None).count().unwrap(), 1);
    assert_eq!(s.objects::<Book>().search("moon", None).count().unwrap(), 1);
    assert_eq!(
        s.search()
            .search(None, Some("moon"))
            .owner_type(OwnerType::Document)
            .fetch()
            .unwrap()
            .into_iter()
            .map(|row| row.owner)
            .collect::<Vec<_>>(),
        vec![OwnerRef::new(OwnerType::Document, d.id.unwrap())]
    );
}

#[test]
fn documents_are_always_public() {
    let mut s = storage();
    let mut d = Document {
        credits: Some("Bibliothèques Sans Frontières".into()),
        ..Document::new("Water filters", "fr")
    };
    let row = s.save_document(&mut d).unwrap();
    assert!(row.public);
    assert_eq!(
        s.objects::<Document>()
            .search("bibliotheques", Some(true))
            .count()
            .unwrap(),
        1
    );
}

#[test]
fn book_becomes_public_with_its_first_specimen() {
    let mut s = storage();
    let mut book = Book {
        isbn: Some("9782070612758".into()),
        authors: Some("Antoine de Saint-Exupéry".into()),
        ..Book::new("Le Petit Prince", "fr")
    };
    let row = s.save_book(&mut book).unwrap();
    assert!(!row.public);
    let book_id = book.id.unwrap();

    let books = || s.objects::<Book>();
    assert_eq!(books().search("exupery", Some(true)).count().unwrap(), 0);
    assert_eq!(books().available().count().unwrap(), 0);

    let mut specimen = BookSpecimen::new(book_id, "BSF-0001");
    let row = s.save_specimen(&mut specimen).unwrap();
    assert!(row.public);
    assert_eq!(row.owner, OwnerRef::new(OwnerType::Book, book_id));

    let books = || s.objects::<Book>();
    assert_eq!(books().search("exupery", Some(true)).count().unwrap(), 1);
    assert_eq!(books().search("9782070*", None).available().count().unwrap(), 1);
    assert_eq!(s.search().count().unwrap(), 1);

    assert!(s.delete_specimen(specimen.id.unwrap()).unwrap());
    assert_eq!(
        s.objects::<Book>().search("exupery", Some(true)).count().unwrap(),
        0
    );
    assert_eq!(s.search().count().unwrap(), 1);
}

#[test]
fn moving_a_specimen_resyncs_both_books() {
    let mut s = storage();
    let mut a = Book::new("First", "en");
    let mut b = Book::new("Second", "en");
    s.save_book(&mut a).unwrap();
    s.save_book(&mut b).unwrap();

    let mut specimen = BookSpecimen::new(a.id.unwrap(), "S-1");
    s.save_specimen(&mut specimen).unwrap();
    specimen.book_id = b.id.unwrap();
    s.save_specimen(&mut specimen).unwrap();

    let search = s.search();
    assert!(!search.get(a.owner_ref().unwrap()).unwrap().unwrap().public);
    assert!(search.get(b.owner_ref().unwrap()).unwrap().unwrap().public);
}

#[test]
fn deleting_a_book_drops_specimens_and_index_row() {
    let mut s = storage();
    let mut book = Book::new("Gone", "en");
    s.save_book(&mut book).unwrap();
    let id = book.id.unwrap();
    s.save_specimen(&mut BookSpecimen::new(id, "G-1")).unwrap();
    s.save_specimen(&mut BookSpecimen::new(id, "G-2")).unwrap();
    assert_eq!(s.specimens(id).unwrap().len(), 2);

    assert!(s.delete_book(id).unwrap());
    assert!(s.specimens(id).unwrap().is_empty());
    assert_eq!(s.search().count().unwrap(), 0);
}

#[test]
fn live_and_cached_visibility_agree() {
    let mut s = storage();
    for (i, status) in [
        ContentStatus::Draft,
        ContentStatus::Published,
        ContentStatus::Deleted,
        ContentStatus::Published,
    ]
    .into_iter()
    .enumerate()
    {
        let mut c = Content {
            status,
            ..Content::new(format!("Story number {i}"))
        };
        s.save_content(&mut c).unwrap();
    }

    let live = s
        .objects::<Content>()
        .search("story", None)
        .published()
        .ids()
        .unwrap();
    let cached = s
        .objects::<Content>()
        .search("story", Some(true))
        .ids()
        .unwrap();
    assert_eq!(live.len(), 2);
    assert_eq!(live, cached);
}

#[test]
fn failed_index_sync_rolls_back_the_owner_save() {
    let mut s = storage();
    let mut c = Content::published("Before");
    s.save_content(&mut c).unwrap();

    s.raw().execute("DROP TABLE search_index", []).unwrap();

    let mut edited = c.clone();
    edited.title = "After".into();
    assert!(s.save_content(&mut edited).is_err());
    assert_eq!(edited.title, "After");
    assert_eq!(edited.modified_at, c.modified_at);

    let stored: Content = s.get(c.id.unwrap()).unwrap().unwrap();
    assert_eq!(stored.title, "Before");

    let mut fresh = Content::draft("Never stored");
    assert!(s.save_content(&mut fresh).is_err());
    assert!(fresh.id.is_none());
    assert_eq!(s.objects::<Content>().count().unwrap(), 1);
}

#[test]
fn failed_index_removal_rolls_back_the_delete() {
    let mut s = storage();
    let c = published(&mut s);
    s.raw().execute("DROP TABLE search_index", []).unwrap();

    assert!(s.delete_content(c.id.unwrap()).is_err());
    assert_eq!(s.objects::<Content>().count().unwrap(), 1);
}

#[test]
fn deleting_an_owner_whose_row_is_gone_is_fine() {
    let mut s = storage();
    let c = published(&mut s);
    s.raw().execute("DELETE FROM search_index", []).unwrap();
    assert!(s.delete_content(c.id.unwrap()).unwrap());
    assert_eq!(s.objects::<Content>().count().unwrap(), 0);
}

#[test]
fn reindex_restores_lost_rows_and_drops_orphans() {
    let mut s = storage();
    published(&mut s);
    draft(&mut s);
    let mut d = Document::new("Manual", "en");
    s.save_document(&mut d).unwrap();

    s.raw()
        .execute("DELETE FROM search_index WHERE owner_type = 'content'", [])
        .unwrap();
    s.raw()
        .execute(
            "INSERT INTO search_index(owner_type, owner_id, text, public) VALUES('book', 99, 'ghost', 1)",
            [],
        )
        .unwrap();

    let report = s.reindex_all().unwrap();
    assert_eq!(report.contents, 2);
    assert_eq!(report.books, 0);
    assert_eq!(report.documents, 1);
    assert_eq!(report.orphans_removed, 1);
    assert_eq!(s.search().count().unwrap(), 3);
    assert_eq!(s.search().search(Some(true), None).count().unwrap(), 2);
}

#[test]
fn stats_count_rows_per_type() {
    let mut s = storage();
    published(&mut s);
    draft(&mut s);
    s.save_book(&mut Book::new("Atlas", "en")).unwrap();

    let stats = s.search().stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.public, 1);
    assert_eq!(stats.by_type.get(&OwnerType::Content), Some(&2));
    assert_eq!(stats.by_type.get(&OwnerType::Book), Some(&1));
    assert_eq!(stats.by_type.get(&OwnerType::Document), None);
}

#[test]
fn staff_sees_drafts_others_do_not() {
    let mut s = storage();
    published(&mut s);
    draft(&mut s);
    deleted(&mut s);

    let count = |viewer: Viewer| s.objects::<Content>().visible_to(viewer).count().unwrap();
    assert_eq!(count(Viewer::Staff), 3);
    assert_eq!(count(Viewer::User), 1);
    assert_eq!(count(Viewer::Anonymous), 1);

    assert_eq!(
        s.search()
            .search(Viewer::Anonymous.search_scope(), Some("content"))
            .count()
            .unwrap(),
        1
    );
    assert_eq!(
        s.search()
            .search(Viewer::Staff.search_scope(), Some("content"))
            .count()
            .unwrap(),
        3
    );
}

#[test]
fn paged_counts_agree_with_fetched_rows() {
    let mut s = storage();
    for title in ["Moon rise", "Moon set", "Moon phases"] {
        s.save_content(&mut Content::published(title)).unwrap();
    }

    let results = s.search().search(None, Some("moon")).limit(1);
    assert_eq!(results.count().unwrap(), 1);
    assert_eq!(results.fetch().unwrap().len(), 1);

    let tail = s.search().search(None, Some("moon")).offset(2);
    assert_eq!(tail.count().unwrap(), 1);
    assert_eq!(tail.fetch().unwrap().len(), 1);

    let past_end = s.search().search(None, Some("moon")).limit(5).offset(3);
    assert_eq!(past_end.count().unwrap(), 0);
    assert!(past_end.fetch().unwrap().is_empty());

    let queryset = s.objects::<Content>().search("moon", None).limit(1);
    assert_eq!(queryset.count().unwrap(), results.count().unwrap());
    assert_eq!(s.search().search(None, Some("moon")).count().unwrap(), 3);
}

#[test]
fn greek_capitals_and_final_sigma_match_lowercase_queries() {
    let mut s = storage();
    let mut c = published(&mut s);
    c.title = "ΟΔΟΣ ΕΛΠΙΔΑΣ".into();
    s.save_content(&mut c).unwrap();
    for query in ["οδοσ", "οδος", "ΟΔΟΣ", "ελπιδα*"] {
        assert_eq!(
            s.objects::<Content>().search(query, None).count().unwrap(),
            1,
            "query {query}"
        );
    }
}
