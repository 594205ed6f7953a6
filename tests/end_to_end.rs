// End-to-end: CSV → resolve → offset → reconcile → viewport

use roommate_map::{
    FetchKind, LayerState, MapController, MemorySurface, ReferenceData, SurfaceEvent, UserRecord,
};

const NEIGHBORHOODS: &str = "\
neighborhood,city_name,state_name,lat,lng,zip
Back Bay,Boston,Massachusetts,42.3503,-71.0810,02116
Fenway,Boston,Massachusetts,42.3467,-71.0972,02215
Zilker,Austin,Texas,30.2669,-97.7729,
Broken Row,Austin,Texas,,-97.7,
";

const CENTROIDS: &str = "\
city,state_id,lat,lng
Boston,MA,42.3601,-71.0589
";

fn reference() -> ReferenceData {
    ReferenceData::load(NEIGHBORHOODS.as_bytes(), Some(CENTROIDS.as_bytes())).unwrap()
}

fn user(id: &str, first: &str, city: &str, neighborhood: &str) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        first_name: first.to_string(),
        last_name: "Test".to_string(),
        email: format!("{}@caltech.edu", first.to_lowercase()),
        country: "USA".to_string(),
        state: None,
        city: city.to_string(),
        neighborhoods: vec![neighborhood.to_string()],
    }
}

fn loaded_controller(users: Vec<UserRecord>) -> MapController<MemorySurface> {
    let mut map = MapController::new();
    map.mount(|| Ok(MemorySurface::loaded()));

    let users_ticket = map.begin_fetch(FetchKind::Users);
    let reference_ticket = map.begin_fetch(FetchKind::Reference);
    assert!(map.complete_users(users_ticket, Ok(users)));
    assert!(map.is_loading());
    assert!(map.complete_reference(reference_ticket, Ok(reference())));
    assert!(!map.is_loading());
    map
}

#[test]
fn test_two_users_in_back_bay() {
    let mut map = loaded_controller(vec![
        user("u1", "Ada", "Boston", "Back Bay"),
        user("u2", "Bob", "Boston", "Back Bay"),
    ]);

    let features = map.layer().rendered();
    assert_eq!(features.len(), 2);

    let first = features.features[0].coordinate();
    let second = features.features[1].coordinate();
    assert_eq!((first.lat, first.lng), (42.3503, -71.0810));
    assert!((second.lat - (42.3503 + 0.005)).abs() < 1e-9);
    assert!((second.lng - (-71.0810 + 0.005)).abs() < 1e-9);

    map.set_city(Some("Boston".to_string()));

    let viewport = map.layer().surface().and_then(|s| s.viewport()).unwrap();
    assert_eq!(viewport.max_zoom, 14.0);
    assert_eq!(viewport.padding, 50.0);
    let sw = viewport.bounds.south_west().unwrap();
    let ne = viewport.bounds.north_east().unwrap();
    // Back Bay and Fenway are the Boston neighborhoods
    assert_eq!((sw.lat, sw.lng), (42.3467, -71.0972));
    assert_eq!((ne.lat, ne.lng), (42.3503, -71.0810));
}

#[test]
fn test_single_neighborhood_city_fits_one_point() {
    let csv = "neighborhood,city_name,lat,lng\nBack Bay,Boston,42.3503,-71.0810\n";
    let reference = ReferenceData::load(csv.as_bytes(), None::<&[u8]>).unwrap();

    let mut map: MapController<MemorySurface> = MapController::new();
    map.mount(|| Ok(MemorySurface::loaded()));
    let ticket = map.begin_fetch(FetchKind::Reference);
    map.complete_reference(ticket, Ok(reference));
    let ticket = map.begin_fetch(FetchKind::Users);
    map.complete_users(
        ticket,
        Ok(vec![user("u1", "Ada", "Boston", "Back Bay"), user("u2", "Bob", "Boston", "Back Bay")]),
    );

    map.set_city(Some("Boston".to_string()));

    let viewport = map.layer().surface().and_then(|s| s.viewport()).unwrap();
    assert_eq!(viewport.max_zoom, 14.0);
    assert_eq!(viewport.bounds.south_west(), viewport.bounds.north_east());
    let point = viewport.bounds.south_west().unwrap();
    assert_eq!((point.lat, point.lng), (42.3503, -71.0810));
}

#[test]
fn test_dropped_rows_and_fallbacks() {
    let reference = reference();
    assert_eq!(reference.neighborhoods.len(), 3);
    assert_eq!(reference.stats.neighborhoods_dropped, 1);

    let map = loaded_controller(vec![
        user("u1", "Ada", "Boston", "Beacon Hill"),
        user("u2", "Bob", "Springfield", "Downtown"),
    ]);

    assert_eq!(map.points().len(), 1);
    assert_eq!((map.points()[0].lat, map.points()[0].lng), (42.3601, -71.0589));
    assert_eq!(map.unmapped_count(), 1);
}

#[test]
fn test_style_load_defers_first_draw() {
    let mut map: MapController<MemorySurface> = MapController::new();
    map.mount(|| MemorySurface::connect(Some("pk.test")));

    let ticket = map.begin_fetch(FetchKind::Reference);
    map.complete_reference(ticket, Ok(reference()));
    let ticket = map.begin_fetch(FetchKind::Users);
    map.complete_users(ticket, Ok(vec![user("u1", "Ada", "Boston", "Back Bay")]));

    assert!(map.layer().rendered().is_empty());
    assert_eq!(map.layer().surface().map(|s| s.source_count()), Some(0));

    // the host flips the style flag, then delivers the event
    if let Some(surface) = map.surface_mut() {
        surface.finish_style_load();
    }
    map.handle_event(SurfaceEvent::StyleLoaded);

    assert_eq!(map.layer().rendered().len(), 1);
}

#[test]
fn test_missing_token_degrades_without_panicking() {
    let mut map: MapController<MemorySurface> = MapController::new();
    let state = map.mount(|| MemorySurface::connect(None)).clone();
    assert!(matches!(state, LayerState::Degraded(_)));

    let ticket = map.begin_fetch(FetchKind::Reference);
    map.complete_reference(ticket, Ok(reference()));
    let ticket = map.begin_fetch(FetchKind::Users);
    map.complete_users(ticket, Ok(vec![user("u1", "Ada", "Boston", "Back Bay")]));

    assert_eq!(map.points().len(), 1);
    assert!(map.layer().rendered().is_empty());
}

#[test]
fn test_results_after_unmount_are_dropped() {
    let mut map: MapController<MemorySurface> = MapController::new();
    map.mount(|| Ok(MemorySurface::loaded()));
    let ticket = map.begin_fetch(FetchKind::Reference);

    map.unmount();

    assert!(!map.complete_reference(ticket, Ok(reference())));
    assert!(map.reference().is_none());
    assert_eq!(map.layer().state(), &LayerState::Disposed);
}
