use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use scriptorium::model::{
    BookPatch, BookStatus, ChapterPatch, ChapterStatus, ChapterType, NewBook, NewChapter,
    word_count,
};
use scriptorium::storage::Database;
use scriptorium::{Error, Repository};

fn repo() -> Repository {
    Repository::new(Arc::new(Database::in_memory()))
}

async fn book_with_chapters(repo: &Repository, titles: &[&str]) -> (String, Vec<String>) {
    let book = repo.books.create(NewBook::new("Book")).await.unwrap();
    let mut ids = Vec::new();
    for title in titles {
        let chapter = repo
            .chapters
            .create(&book.id, NewChapter::new(*title))
            .await
            .unwrap();
        ids.push(chapter.id);
    }
    (book.id, ids)
}

async fn orders(repo: &Repository, book_id: &str) -> Vec<(String, i64)> {
    repo.chapters
        .list(book_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.title, c.order))
        .collect()
}

#[tokio::test]
async fn test_new_book_defaults() {
    let repo = repo();
    let book = repo
        .books
        .create(NewBook::new("Night Train").with_author("Ann"))
        .await
        .unwrap();
    assert_eq!(book.title, "Night Train");
    assert_eq!(book.author_name, "Ann");
    assert_eq!(book.language, "en");
    assert_eq!(book.status, BookStatus::Draft);
    assert_eq!(book.word_count, 0);
    assert!(book.last_opened_at.is_none());
    assert_eq!(book.created_at, book.updated_at);
}

#[tokio::test]
async fn test_load_stamps_last_opened_but_get_does_not() {
    let repo = repo();
    let book = repo.books.create(NewBook::new("A")).await.unwrap();

    assert!(repo.books.get(&book.id).await.unwrap().last_opened_at.is_none());
    let loaded = repo.books.load(&book.id).await.unwrap();
    assert!(loaded.last_opened_at.is_some());

    assert!(matches!(
        repo.books.load("missing").await,
        Err(Error::NotFound { kind: "book", .. })
    ));
}

#[tokio::test]
async fn test_list_puts_recently_opened_first() {
    let repo = repo();
    let first = repo.books.create(NewBook::new("First")).await.unwrap();
    repo.books.create(NewBook::new("Second")).await.unwrap();
    repo.books.load(&first.id).await.unwrap();

    let titles: Vec<_> = repo
        .books
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(titles, ["First", "Second"]);
}

#[tokio::test]
async fn test_sparse_book_update() {
    let repo = repo();
    let book = repo
        .books
        .create(NewBook::new("A").with_subtitle("Sub"))
        .await
        .unwrap();
    let updated = repo
        .books
        .update(
            &book.id,
            BookPatch {
                title: Some("B".into()),
                status: Some(BookStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "B");
    assert_eq!(updated.subtitle.as_deref(), Some("Sub"));
    assert_eq!(updated.status, BookStatus::InProgress);

    let cleared = repo
        .books
        .update(
            &book.id,
            BookPatch {
                subtitle: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.subtitle.is_none());
    assert_eq!(cleared.title, "B");
}

#[tokio::test]
async fn test_chapters_append_in_order() {
    let repo = repo();
    let (book_id, _) = book_with_chapters(&repo, &["A", "B", "C"]).await;
    assert_eq!(
        orders(&repo, &book_id).await,
        [("A".into(), 0), ("B".into(), 1), ("C".into(), 2)]
    );

    let chapter = &repo.chapters.list(&book_id).await.unwrap()[0];
    assert_eq!(chapter.chapter_type, ChapterType::Chapter);
    assert_eq!(chapter.status, ChapterStatus::Draft);
    assert!(chapter.is_included_in_export);
    assert!(chapter.content.is_none());
}

#[tokio::test]
async fn test_create_chapter_for_missing_book() {
    let repo = repo();
    assert!(matches!(
        repo.chapters.create("nope", NewChapter::new("x")).await,
        Err(Error::NotFound { kind: "book", .. })
    ));
}

#[tokio::test]
async fn test_content_update_syncs_word_counts() {
    let repo = repo();
    let (book_id, ids) = book_with_chapters(&repo, &["A", "B"]).await;

    let a = repo
        .chapters
        .update(&ids[0], ChapterPatch::content("<p>one two three</p>"))
        .await
        .unwrap();
    assert_eq!(a.word_count, 3);
    repo.chapters
        .update(&ids[1], ChapterPatch::content("<p>four&nbsp;five</p>"))
        .await
        .unwrap();
    assert_eq!(repo.books.get(&book_id).await.unwrap().word_count, 5);

    // non-content updates leave counts alone
    repo.chapters
        .update(
            &ids[0],
            ChapterPatch {
                title: Some("Renamed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(repo.books.get(&book_id).await.unwrap().word_count, 5);

    repo.chapters.delete(&ids[1]).await.unwrap();
    assert_eq!(repo.books.get(&book_id).await.unwrap().word_count, 3);
}

#[tokio::test]
async fn test_delete_closes_order_gap() {
    let repo = repo();
    let (book_id, ids) = book_with_chapters(&repo, &["A", "B", "C", "D"]).await;
    repo.chapters.delete(&ids[1]).await.unwrap();
    assert_eq!(
        orders(&repo, &book_id).await,
        [("A".into(), 0), ("C".into(), 1), ("D".into(), 2)]
    );

    let e = repo.chapters.create(&book_id, NewChapter::new("E")).await.unwrap();
    assert_eq!(e.order, 3);
}

#[tokio::test]
async fn test_reorder_rewrites_every_position() {
    let repo = repo();
    let (book_id, ids) = book_with_chapters(&repo, &["A", "B", "C"]).await;
    let new_order = vec![ids[2].clone(), ids[0].clone(), ids[1].clone()];
    repo.chapters.reorder(&book_id, &new_order).await.unwrap();
    assert_eq!(
        orders(&repo, &book_id).await,
        [("C".into(), 0), ("A".into(), 1), ("B".into(), 2)]
    );
}

#[tokio::test]
async fn test_reorder_rejects_bad_lists() {
    let repo = repo();
    let (book_id, ids) = book_with_chapters(&repo, &["A", "B"]).await;
    let (_, other) = book_with_chapters(&repo, &["X"]).await;

    for bad in [
        vec![ids[0].clone()],
        vec![ids[0].clone(), ids[0].clone()],
        vec![ids[0].clone(), other[0].clone()],
    ] {
        assert!(matches!(
            repo.chapters.reorder(&book_id, &bad).await,
            Err(Error::InvalidReorder(_))
        ));
    }
    assert_eq!(
        orders(&repo, &book_id).await,
        [("A".into(), 0), ("B".into(), 1)]
    );
}

#[tokio::test]
async fn test_deleting_book_removes_chapters() {
    let repo = repo();
    let (book_id, ids) = book_with_chapters(&repo, &["A", "B"]).await;
    repo.books.delete(&book_id).await.unwrap();

    assert!(repo.chapters.list(&book_id).await.unwrap().is_empty());
    assert!(matches!(
        repo.chapters.get(&ids[0]).await,
        Err(Error::NotFound { kind: "chapter", .. })
    ));
    assert!(repo.books.delete(&book_id).await.is_err());
}

#[tokio::test]
async fn test_settings_store() {
    let repo = repo();
    assert_eq!(repo.settings.get("theme").await.unwrap(), None);
    repo.settings.set("theme", "dark").await.unwrap();
    repo.settings.set("theme", "light").await.unwrap();
    assert_eq!(repo.settings.get("theme").await.unwrap().as_deref(), Some("light"));

    repo.settings.set_json("recent", &["a", "b"]).await.unwrap();
    let recent: Option<Vec<String>> = repo.settings.get_json("recent").await.unwrap();
    assert_eq!(recent, Some(vec!["a".to_string(), "b".to_string()]));
    assert_eq!(repo.settings.all().await.unwrap().len(), 2);

    assert!(repo.settings.delete("theme").await.unwrap());
    assert!(!repo.settings.delete("theme").await.unwrap());
}

#[tokio::test]
async fn test_cover_templates() {
    let repo = repo();
    let saved = repo
        .cover_templates
        .save("Classic", &json!({"background": "#000", "font": "Garamond"}))
        .await
        .unwrap();
    assert_eq!(saved.data["font"], "Garamond");

    let updated = repo
        .cover_templates
        .update(&saved.id, "Classic II", &json!({"background": "#fff"}))
        .await
        .unwrap();
    assert_eq!(updated.name, "Classic II");
    assert_eq!(repo.cover_templates.list().await.unwrap().len(), 1);

    repo.cover_templates.delete(&saved.id).await.unwrap();
    assert!(repo.cover_templates.get(&saved.id).await.is_err());
    assert!(matches!(
        repo.cover_templates.delete(&saved.id).await,
        Err(Error::NotFound { .. })
    ));
    assert!(
        repo.cover_templates
            .update(&saved.id, "x", &json!({}))
            .await
            .is_err()
    );
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_book_word_count_is_sum_of_chapters(
        bodies in prop::collection::vec("[a-z ]{0,40}", 1..6),
        deleted in any::<prop::sample::Index>(),
    ) {
        runtime().block_on(async {
            let repo = repo();
            let book = repo.books.create(NewBook::new("B")).await.unwrap();
            let mut ids = Vec::new();
            for body in &bodies {
                let chapter = repo.chapters.create(&book.id, NewChapter::new("c")).await.unwrap();
                repo.chapters
                    .update(&chapter.id, ChapterPatch::content(format!("<p>{body}</p>")))
                    .await
                    .unwrap();
                ids.push(chapter.id);
            }

            let expected: i64 = bodies.iter().map(|b| word_count(b)).sum();
            prop_assert_eq!(repo.books.get(&book.id).await.unwrap().word_count, expected);

            let victim = deleted.index(ids.len());
            repo.chapters.delete(&ids[victim]).await.unwrap();
            let remaining: i64 = repo
                .chapters
                .list(&book.id)
                .await
                .unwrap()
                .iter()
                .map(|c| c.word_count)
                .sum();
            prop_assert_eq!(repo.books.get(&book.id).await.unwrap().word_count, remaining);
            Ok(())
        })?;
    }

    #[test]
    fn prop_reorder_keeps_positions_dense(
        permutation in (1usize..8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle()),
    ) {
        runtime().block_on(async {
            let repo = repo();
            let book = repo.books.create(NewBook::new("B")).await.unwrap();
            let mut ids = Vec::new();
            for i in 0..permutation.len() {
                let chapter = repo
                    .chapters
                    .create(&book.id, NewChapter::new(i.to_string()))
                    .await
                    .unwrap();
                ids.push(chapter.id);
            }

            let ordered: Vec<String> = permutation.iter().map(|&i| ids[i].clone()).collect();
            repo.chapters.reorder(&book.id, &ordered).await.unwrap();

            let listed = repo.chapters.list(&book.id).await.unwrap();
            let positions: Vec<i64> = listed.iter().map(|c| c.order).collect();
            prop_assert_eq!(positions, (0..listed.len() as i64).collect::<Vec<_>>());
            let listed_ids: Vec<String> = listed.into_iter().map(|c| c.id).collect();
            prop_assert_eq!(listed_ids, ordered);
            Ok(())
        })?;
    }
}
