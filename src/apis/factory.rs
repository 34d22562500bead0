use std::sync::Arc;

use super::artscentre::ArtsCentreCrawler;
use super::base::SourceAdapter;
use super::eventbrite::EventbriteApi;
use super::feverup::FeverupCrawler;
use super::marriner::MarrinerCrawler;
use super::ticketmaster::TicketmasterApi;
use super::whatson::WhatsOnCrawler;
use crate::domain::EventSource;

pub fn create_adapter(source: EventSource) -> Arc<dyn SourceAdapter> {
    match source {
        EventSource::Ticketmaster => Arc::new(TicketmasterApi::new()),
        EventSource::Eventbrite => Arc::new(EventbriteApi::new()),
        EventSource::Artscentre => Arc::new(ArtsCentreCrawler::artscentre()),
        EventSource::Marriner => Arc::new(MarrinerCrawler::marriner()),
        EventSource::Feverup => Arc::new(FeverupCrawler::feverup()),
        EventSource::Whatson => Arc::new(WhatsOnCrawler::whatson()),
    }
}
