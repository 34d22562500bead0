pub mod eventbrite;
pub mod ticketmaster;
pub mod venue_page;
