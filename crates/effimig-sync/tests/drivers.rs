mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use common::{article, migrator, utc, write_page, FixtureCmsStore, FixtureWebStore};
use effimig_core::{LegacyNode, LegacyUser, RedirectRule, TargetPost, UrlAlias, WriteMode};
use effimig_extract::CategoryRule;
use effimig_storage::{MemoryTargetStore, TargetStore};
use effimig_sync::{DriverKind, HandPickedPage, MigrationRules, SyncError};
use tempfile::tempdir;

fn web_with(articles: Vec<effimig_core::LegacyArticle>) -> Arc<FixtureWebStore> {
    Arc::new(FixtureWebStore { articles })
}

#[tokio::test]
async fn articles_become_posts_with_redirects_and_reruns_are_no_ops() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    write_page(
        root.path(),
        "yhdistys/kokoukset/kevat.html",
        "<h1>Kevätkokous</h1>\n<p>Kokous pidettiin 3.4.99 <a href=\"poytakirja.html\">pöytäkirja</a></p>",
    );
    let web = web_with(vec![
        article(
            "yhdistys/kokoukset/kevat.html",
            "Kevätkokous",
            Some("Matti Meikäläinen"),
        ),
        article("puuttuu.html", "Puuttuu", None),
        article("liite.pdf", "Liite", None),
    ]);
    let target = Arc::new(MemoryTargetStore::new());
    let migrator = migrator(root.path(), wp.path(), MigrationRules::default(), target.clone())
        .with_web(web);

    let authors = migrator.run(DriverKind::ArticleAuthors).await.expect("authors");
    assert_eq!(authors.users.inserted, 1);

    let report = migrator.run(DriverKind::Articles).await.expect("articles");
    assert_eq!(report.fetched, 3);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.posts.inserted, 1);
    assert_eq!(report.redirects.inserted, 1);

    let snapshot = target.snapshot().await;
    let post = snapshot.post_by_title("Kevätkokous").expect("post");
    let author_id = target
        .user_id_by_login("MattiMeiklinen")
        .await
        .expect("lookup")
        .expect("author");
    assert_eq!(post.author, author_id);
    assert_eq!(post.slug, "yhdistys-kokoukset-kevat");
    assert_eq!(post.date, utc(1999, 4, 3));
    assert_eq!(post.excerpt, "");
    assert_eq!(
        post.content,
        "<p>Kokous pidettiin 3.4.99 <a href=\"/yhdistys/kokoukset/poytakirja.html\">pöytäkirja</a></p>"
    );
    let redirect = snapshot
        .redirect_for("/yhdistys/kokoukset/kevat.html")
        .expect("redirect");
    assert_eq!(redirect.action_data, "/yhdistys-kokoukset-kevat");
    assert_eq!(redirect.action_code, 301);

    let rerun = migrator.run(DriverKind::Articles).await.expect("rerun");
    assert_eq!(rerun.posts.inserted, 0);
    assert_eq!(rerun.posts.unchanged, 1);
    assert_eq!(rerun.redirects.unchanged, 1);
    assert_eq!(target.snapshot().await.posts().len(), 1);
}

#[tokio::test]
async fn unknown_article_author_aborts_the_batch() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    write_page(root.path(), "a.html", "<p>12.6.2004</p>");
    let web = web_with(vec![article("a.html", "A", Some("Tuntematon"))]);
    let target = Arc::new(MemoryTargetStore::new());
    let migrator =
        migrator(root.path(), wp.path(), MigrationRules::default(), target.clone()).with_web(web);

    let err = migrator.run(DriverKind::Articles).await.expect_err("must fail");
    assert!(matches!(err, SyncError::MissingAuthor { ref author, .. } if author == "Tuntematon"));
    assert!(target.snapshot().await.posts().is_empty());
}

#[tokio::test]
async fn undated_articles_use_overrides_or_are_skipped() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    write_page(root.path(), "vanhat/toimintasuunnitelma-2003.html", "<p>Suunnitelma</p>");
    write_page(root.path(), "vanhat/muistio.html", "<p>Ei päivämäärää</p>");
    let mut explicit = article("vanhat/uutinen.html", "Uutinen", None);
    explicit.published = Some(utc(2004, 1, 15));
    explicit.summary = Some("Lyhyesti".into());
    write_page(root.path(), "vanhat/uutinen.html", "<p>Päivitetty 12.6.2004</p>");

    let web = web_with(vec![
        article("vanhat/toimintasuunnitelma-2003.html", "Toimintasuunnitelma", None),
        article("vanhat/muistio.html", "Muistio", None),
        explicit,
    ]);
    let target = Arc::new(MemoryTargetStore::new());
    let migrator =
        migrator(root.path(), wp.path(), MigrationRules::default(), target.clone()).with_web(web);

    let report = migrator.run(DriverKind::Articles).await.expect("articles");
    assert_eq!(report.posts.inserted, 2);
    assert_eq!(report.skipped, 1);

    let snapshot = target.snapshot().await;
    let plan = snapshot.post_by_title("Toimintasuunnitelma").expect("plan");
    assert_eq!(plan.date, utc(2003, 6, 13));
    assert_eq!(plan.author, 1);
    let news = snapshot.post_by_title("Uutinen").expect("news");
    assert_eq!(news.date, utc(2004, 1, 15));
    assert_eq!(news.excerpt, "Lyhyesti");
    assert!(snapshot.post_by_title("Muistio").is_none());
}

fn cms_fixture() -> FixtureCmsStore {
    FixtureCmsStore {
        users: vec![
            LegacyUser {
                uid: 0,
                name: String::new(),
                pass: String::new(),
                mail: String::new(),
                created: 0,
            },
            LegacyUser {
                uid: 7,
                name: "Liisa".into(),
                pass: "5f4dcc3b".into(),
                mail: "liisa@example.org".into(),
                created: 1_000_000_000,
            },
        ],
        nodes: vec![
            LegacyNode {
                nid: 1,
                uid: 7,
                title: "KevÃ¤t".into(),
                body: "<h2>KevÃ¤t</h2>\n<p>PÃ¤Ã¤kirjoitus</p>".into(),
                teaser: "PÃ¤Ã¤".into(),
                created: 1_087_000_000,
            },
            LegacyNode {
                nid: 2,
                uid: 7,
                title: "Tyhjä".into(),
                body: String::new(),
                teaser: String::new(),
                created: 1_087_000_000,
            },
            LegacyNode {
                nid: 3,
                uid: 7,
                title: "Ei osoitetta".into(),
                body: "<p>x</p>".into(),
                teaser: String::new(),
                created: 1_087_000_000,
            },
        ],
        aliases: vec![
            UrlAlias {
                src: "node/1".into(),
                dst: "yhdistys/kevat/index.html".into(),
            },
            UrlAlias {
                src: "node/1".into(),
                dst: "kevat.html".into(),
            },
        ],
    }
}

#[tokio::test]
async fn cms_users_and_nodes_are_migrated() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    let target = Arc::new(MemoryTargetStore::new());
    let migrator = migrator(root.path(), wp.path(), MigrationRules::default(), target.clone())
        .with_cms(Arc::new(cms_fixture()));

    let users = migrator.run(DriverKind::CmsUsers).await.expect("users");
    assert_eq!(users.users.inserted, 1);
    assert_eq!(users.skipped, 1);

    let nodes = migrator.run(DriverKind::CmsNodes).await.expect("nodes");
    assert_eq!(nodes.fetched, 3);
    assert_eq!(nodes.skipped, 2);
    assert_eq!(nodes.posts.inserted, 1);
    assert_eq!(nodes.redirects.inserted, 3);

    let snapshot = target.snapshot().await;
    let user = snapshot.users()[0].clone();
    assert_eq!(user.login, "Liisa");
    assert_eq!(user.email, "liisa@example.org");

    let post = snapshot.post_by_title("Kevät").expect("post");
    assert_eq!(post.slug, "yhdistys-kevat-index");
    assert_eq!(post.content, "\n<p>Pääkirjoitus</p>");
    assert_eq!(post.excerpt, "Pää");
    assert_eq!(post.date, Utc.timestamp_opt(1_087_000_000, 0).unwrap());
    assert_eq!(
        Some(post.author),
        target.user_id_by_login("Liisa").await.expect("lookup")
    );
    for url in ["/yhdistys/kevat/index.html", "/yhdistys/kevat/", "/kevat.html"] {
        let rule = snapshot.redirect_for(url).expect(url);
        assert_eq!(rule.action_data, "/yhdistys-kevat-index");
    }

    let again = migrator.run(DriverKind::CmsUsers).await.expect("users again");
    assert_eq!(again.users.unchanged, 1);
}

#[tokio::test]
async fn node_without_cms_user_aborts() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    let mut cms = cms_fixture();
    cms.users.clear();
    let migrator = migrator(
        root.path(),
        wp.path(),
        MigrationRules::default(),
        Arc::new(MemoryTargetStore::new()),
    )
    .with_cms(Arc::new(cms));

    let err = migrator.run(DriverKind::CmsNodes).await.expect_err("must fail");
    assert!(matches!(err, SyncError::MissingCmsUser { uid: 7, .. }));
}

#[tokio::test]
async fn hand_picked_pages_are_upserted_by_slug() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    let page_path = root.path().join("jasenyys.html");
    std::fs::write(
        &page_path,
        "<html>\n<head>\n<title>Liity jäseneksi</title>\n</head>\n<body>\n<p>Jäseneksi voi liittyä.</p>\n</body>\n</html>\n",
    )
    .expect("write");
    let rules = MigrationRules {
        pages: vec![HandPickedPage {
            path: "jasenyys.html".into(),
            title: None,
            author: None,
            published: Some(utc(2010, 1, 1)),
        }],
        ..MigrationRules::default()
    };
    let target = Arc::new(MemoryTargetStore::new());
    let migrator = migrator(root.path(), wp.path(), rules, target.clone());

    let first = migrator.run(DriverKind::Pages).await.expect("pages");
    assert_eq!(first.posts.inserted, 1);
    let second = migrator.run(DriverKind::Pages).await.expect("pages again");
    assert_eq!(second.posts.unchanged, 1);

    std::fs::write(
        &page_path,
        "<html>\n<head>\n<title>Liity jäseneksi</title>\n</head>\n<body>\n<p>Jäsenmaksu on 10 euroa.</p>\n</body>\n</html>\n",
    )
    .expect("rewrite");
    let third = migrator.run(DriverKind::Pages).await.expect("pages updated");
    assert_eq!(third.posts.updated, 1);

    let snapshot = target.snapshot().await;
    assert_eq!(snapshot.posts().len(), 1);
    let post = snapshot.post_by_title("Liity jäseneksi").expect("page");
    assert_eq!(post.slug, "jasenyys");
    assert_eq!(post.content, "<p>Jäsenmaksu on 10 euroa.</p>");
    assert_eq!(
        snapshot.redirect_for("/jasenyys.html").map(|r| r.action_data.as_str()),
        Some("/jasenyys")
    );
}

#[tokio::test]
async fn attachments_are_copied_and_redirected() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    for (rel, bytes) in [
        ("julkaisut/esite.pdf", &b"%PDF-1.4"[..]),
        ("index.html", &b"<html></html>"[..]),
        ("meta/lib/x.js", &b"js"[..]),
        ("meta/nav.inc", &b"inc"[..]),
    ] {
        let path = root.path().join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, bytes).expect("write");
    }
    let target = Arc::new(MemoryTargetStore::new());
    let migrator = migrator(root.path(), wp.path(), MigrationRules::default(), target.clone());

    let report = migrator.run(DriverKind::Attachments).await.expect("attachments");
    assert_eq!(report.fetched, 1);
    assert_eq!(report.attachments_copied, 1);
    assert_eq!(report.redirects.inserted, 1);
    assert_eq!(
        std::fs::read(wp.path().join("wp-content/uploads/julkaisut/esite.pdf")).expect("copied"),
        b"%PDF-1.4"
    );
    let snapshot = target.snapshot().await;
    assert_eq!(
        snapshot.redirect_for("/julkaisut/esite.pdf").map(|r| r.action_data.as_str()),
        Some("/wp-content/uploads/julkaisut/esite.pdf")
    );

    let again = migrator.run(DriverKind::Attachments).await.expect("again");
    assert_eq!(again.attachments_deduplicated, 1);
    assert_eq!(again.redirects.unchanged, 1);
}

#[tokio::test]
async fn dry_run_leaves_uploads_untouched() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    std::fs::write(root.path().join("kuva.png"), b"png").expect("write");
    let target = Arc::new(MemoryTargetStore::new());
    let migrator = migrator(root.path(), wp.path(), MigrationRules::default(), target.clone())
        .with_dry_run(true);

    let report = migrator.run(DriverKind::Attachments).await.expect("attachments");
    assert_eq!(report.attachments_copied, 0);
    assert_eq!(report.redirects.inserted, 1);
    assert!(!wp.path().join("wp-content").exists());
}

#[tokio::test]
async fn redirect_file_is_upserted() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    let file = root.path().join("redirects.txt");
    std::fs::write(
        &file,
        "\"/vanha.html\" => \"/uusi\"\n\"/sama\" => \"/sama\"\nroskaa\n",
    )
    .expect("write");
    let target = Arc::new(MemoryTargetStore::new());
    let migrator = migrator(root.path(), wp.path(), MigrationRules::default(), target.clone());

    let report = migrator.import_redirect_file(&file).await.expect("import");
    assert_eq!(report.redirects.inserted, 1);
    assert_eq!(report.skipped, 2);

    std::fs::write(&file, "\"/vanha.html\" => \"/uudempi\"\n").expect("rewrite");
    let report = migrator.import_redirect_file(&file).await.expect("reimport");
    assert_eq!(report.redirects.updated, 1);
    let snapshot = target.snapshot().await;
    assert_eq!(snapshot.redirects().len(), 1);
    assert_eq!(snapshot.redirects()[0].action_data, "/uudempi");
}

#[tokio::test]
async fn posts_get_the_longest_matching_category() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    let target = Arc::new(MemoryTargetStore::new());
    let date = utc(2004, 6, 12);
    for (slug, old) in [
        ("yhdistys-kokoukset-kevat", "/yhdistys/kokoukset/kevat.html"),
        ("muu", "/muu.html"),
    ] {
        target
            .seed_post(TargetPost::published(1, date, slug, slug, "", ""))
            .await;
        let rule = RedirectRule::permanent(old, format!("/{slug}")).expect("rule");
        target
            .write_redirect(&rule, WriteMode::InsertIfMissing)
            .await
            .expect("redirect");
    }
    let rules = MigrationRules {
        categories: vec![
            CategoryRule {
                slug: "yhdistys".into(),
                name: "Yhdistys".into(),
                prefixes: vec!["/yhdistys/".into()],
            },
            CategoryRule {
                slug: "kokoukset".into(),
                name: "Kokoukset".into(),
                prefixes: vec!["/yhdistys/kokoukset/".into()],
            },
        ],
        ..MigrationRules::default()
    };
    let migrator = migrator(root.path(), wp.path(), rules, target.clone());

    let report = migrator.run(DriverKind::Categories).await.expect("categories");
    assert_eq!(report.relationships.inserted, 2);
    assert_eq!(report.categories_recounted, 3);

    let snapshot = target.snapshot().await;
    assert_eq!(snapshot.category("kokoukset").map(|c| c.count), Some(1));
    assert_eq!(snapshot.category("yleinen").map(|c| c.count), Some(1));
    assert_eq!(snapshot.category("yhdistys").map(|c| c.count), Some(0));

    let again = migrator.run(DriverKind::Categories).await.expect("again");
    assert_eq!(again.relationships.unchanged, 2);
}

#[tokio::test]
async fn run_all_follows_dependency_order() {
    let root = tempdir().expect("root");
    let wp = tempdir().expect("wp");
    write_page(root.path(), "a.html", "<p>1.2.2003</p>");
    let target = Arc::new(MemoryTargetStore::new());
    let migrator = migrator(root.path(), wp.path(), MigrationRules::default(), target.clone())
        .with_web(web_with(vec![article("a.html", "A", Some("Liisa"))]))
        .with_cms(Arc::new(cms_fixture()));

    migrator.prepare(&DriverKind::ALL).await.expect("prepare");
    let reports = migrator.run_all(None).await.expect("all");
    let names: Vec<_> = reports.iter().map(|r| r.driver.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "cms-users",
            "article-authors",
            "cms-nodes",
            "articles",
            "pages",
            "attachments",
            "categories"
        ]
    );
    let snapshot = target.snapshot().await;
    assert_eq!(snapshot.posts().len(), 2);
    assert_eq!(snapshot.category("yleinen").map(|c| c.count), Some(2));
}
