use effimig_extract::{ArticleExtractor, LinkRewriter};
use tempfile::tempdir;

fn extractor(root: &std::path::Path) -> ArticleExtractor {
    ArticleExtractor::new(root, LinkRewriter::new("@effi.org"))
}

#[tokio::test]
async fn missing_html_file_yields_no_content() {
    let dir = tempdir().expect("tempdir");
    let body = extractor(dir.path()).extract("ei/ole/olemassa.html", Some("X")).await;
    assert!(body.is_none());
}

#[tokio::test]
async fn non_html_targets_are_not_read() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(dir.path().join("liite.pdf"), b"%PDF-1.4").expect("write");
    assert!(extractor(dir.path()).extract("liite.pdf", None).await.is_none());
}

#[tokio::test]
async fn latin1_page_is_extracted_and_links_rewritten() {
    let dir = tempdir().expect("tempdir");
    let page_dir = dir.path().join("yhdistys/kokoukset");
    std::fs::create_dir_all(&page_dir).expect("mkdir");
    let mut page = Vec::new();
    page.extend_from_slice(b"<html>\n<head>\n<meta http-equiv=\"Content-Type\" content=\"text/html; charset=iso-8859-1\">\n<title>Kev\xe4tkokous</title>\n</head>\n<body>\n");
    page.extend_from_slice(b"<?php include('../../meta/nav.inc'); ?>\n");
    page.extend_from_slice(b"<h1>Kev\xe4tkokous</h1>\n");
    page.extend_from_slice(b"<p>Kokous pidettiin 3.4.99 <a href=\"poytakirja.html\">p\xf6yt\xe4kirja</a></p>\n");
    page.extend_from_slice(b"<p><a href=\"hallitus@effi.org\">hallitus</a></p>\n");
    page.extend_from_slice(b"</body>\n</html>\n");
    std::fs::write(page_dir.join("kevat.html"), &page).expect("write");

    let body = extractor(dir.path())
        .extract("yhdistys/kokoukset/kevat.html", Some("Kevätkokous"))
        .await
        .expect("body");

    assert_eq!(
        body,
        "<p>Kokous pidettiin 3.4.99 <a href=\"/yhdistys/kokoukset/poytakirja.html\">pöytäkirja</a></p>\n<p><a href=\"mailto:hallitus@effi.org\">hallitus</a></p>"
    );
}

#[tokio::test]
async fn page_title_is_read_from_the_file() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("jasenyys.html"),
        "<html><head><title>Liity jäseneksi</title></head><body></body></html>",
    )
    .expect("write");
    let title = extractor(dir.path()).page_title("jasenyys.html").await;
    assert_eq!(title.as_deref(), Some("Liity jäseneksi"));
}
